use std::process::ExitCode;

fn main() -> ExitCode {
    stylematch_cli::run()
}
