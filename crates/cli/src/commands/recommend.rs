use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use stylematch_core::config::LoadOptions;
use stylematch_core::recommend::RecommendationRequest;
use tracing::debug;

use crate::commands::{open_pool, prepare, restore_session, CommandResult, Failure, Stores};

pub fn run(
    options: &LoadOptions,
    user_id: Option<&str>,
    limit: Option<usize>,
    seed: Option<u64>,
) -> CommandResult {
    let (config, runtime) = match prepare("recommend", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let stores = Stores::new(&pool);
        let engine = stores.engine(&config);

        let mut request = match user_id {
            Some(user_id) => {
                match restore_session(&engine, &stores, user_id, chrono::Utc::now()).await {
                    Ok(replayed) => debug!(user_id, replayed, "session restored"),
                    // The engine treats sessions as advisory; carry on without one.
                    Err(error) => debug!(user_id, error = %error, "session restore skipped"),
                }
                RecommendationRequest::new(user_id)
            }
            None => RecommendationRequest::anonymous(),
        };
        if let Some(limit) = limit {
            request = request.with_limit(limit);
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let recommendation = engine.recommend(request, &mut rng).await;

        pool.close().await;
        Ok::<_, Failure>(recommendation)
    });

    match result {
        Ok(recommendation) => CommandResult::success_with_data(
            "recommend",
            format!(
                "{} products via {} ranking",
                recommendation.products.len(),
                recommendation.strategy.as_str()
            ),
            Some(json!(recommendation)),
        ),
        Err(failure) => failure.into_result("recommend"),
    }
}
