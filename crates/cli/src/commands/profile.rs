use anyhow::Context;
use serde_json::json;
use stylematch_core::config::LoadOptions;

use crate::commands::{open_pool, prepare, CommandResult, Failure, Stores};

const TOP_TAGS: usize = 5;

pub fn run(options: &LoadOptions, user_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("profile", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let engine = Stores::new(&pool).engine(&config);

        let profile = engine
            .profile_for(user_id)
            .await
            .with_context(|| format!("building profile for {user_id}"))
            .map_err(|error| Failure::operation("profile_build", error))?;

        pool.close().await;
        Ok::<_, Failure>(profile)
    });

    match result {
        Ok(profile) => CommandResult::success_with_data(
            "profile",
            format!(
                "profile for {user_id} built from {} interactions ({:?})",
                profile.interaction_count,
                profile.maturity()
            ),
            Some(json!({
                "maturity": profile.maturity(),
                "top_tags": profile.top_tags(TOP_TAGS),
                "profile": profile.as_ref(),
            })),
        ),
        Err(failure) => failure.into_result("profile"),
    }
}
