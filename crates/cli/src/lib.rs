pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stylematch_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "stylematch",
    about = "Stylematch operator CLI",
    long_about = "Inspect configuration, manage the catalog database, record swipes and request personalized recommendations.",
    after_help = "Examples:\n  stylematch seed\n  stylematch recommend --user demo-user --limit 10\n  stylematch interact --user demo-user --product demo-p-004 --outcome yes"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a stylematch.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo catalog and demo user histories")]
    Seed,
    #[command(about = "Record one interaction and report the resulting session adjustments")]
    Interact {
        #[arg(long)]
        user: String,
        #[arg(long)]
        product: String,
        #[arg(long, help = "yes | no | view | click | favorite")]
        outcome: String,
        #[arg(long = "response-ms")]
        response_ms: Option<u32>,
    },
    #[command(about = "Build and show the preference profile for a user")]
    Profile {
        #[arg(long)]
        user: String,
    },
    #[command(about = "Produce a ranked, diversified recommendation list")]
    Recommend {
        #[arg(long, help = "Omit for the anonymous popularity ranking")]
        user: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, help = "Seed for deterministic noise and exploration draws")]
        seed: Option<u64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Interact { user, product, outcome, response_ms } => {
            commands::interact::run(&options, &user, &product, &outcome, response_ms)
        }
        Command::Profile { user } => commands::profile::run(&options, &user),
        Command::Recommend { user, limit, seed } => {
            commands::recommend::run(&options, user.as_deref(), limit, seed)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command payload. Repeated
/// calls keep the first subscriber.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
