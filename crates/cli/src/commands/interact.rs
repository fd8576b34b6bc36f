use chrono::Utc;
use serde_json::json;
use stylematch_core::config::LoadOptions;
use stylematch_core::domain::interaction::{Interaction, Outcome};
use stylematch_core::ApplicationError;

use crate::commands::{open_pool, prepare, restore_session, CommandResult, Failure, Stores};

pub fn run(
    options: &LoadOptions,
    user_id: &str,
    product_id: &str,
    outcome: &str,
    response_ms: Option<u32>,
) -> CommandResult {
    let outcome = match outcome.parse::<Outcome>() {
        Ok(outcome) => outcome,
        Err(error) => {
            let error = ApplicationError::from(error);
            return CommandResult::failure("interact", error.error_class(), error.to_string(), 6);
        }
    };
    let (config, runtime) = match prepare("interact", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let stores = Stores::new(&pool);
        let engine = stores.engine(&config);
        let now = Utc::now();

        restore_session(&engine, &stores, user_id, now)
            .await
            .map_err(|error| Failure::operation("session_restore", error))?;

        let mut interaction = Interaction::new(user_id, product_id, outcome, now);
        interaction.response_time_ms = response_ms;
        let adjustments = engine.record_interaction(interaction).await.map_err(|error| {
            let class = error.error_class();
            Failure::operation(class, anyhow::Error::new(error).context("recording interaction"))
        })?;

        pool.close().await;
        Ok::<_, Failure>(adjustments)
    });

    match result {
        Ok(adjustments) => CommandResult::success_with_data(
            "interact",
            format!("recorded {outcome} for {product_id}"),
            Some(json!({ "session": adjustments })),
        ),
        Err(failure) => failure.into_result("interact"),
    }
}
