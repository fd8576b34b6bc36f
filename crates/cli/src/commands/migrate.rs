use stylematch_core::config::LoadOptions;
use tracing::info;

use crate::commands::{open_pool, prepare, CommandResult, Failure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("migrate", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        pool.close().await;
        info!(event_name = "cli.migrate.completed", "pending migrations applied");
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}
