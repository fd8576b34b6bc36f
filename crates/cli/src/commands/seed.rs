use serde_json::json;
use stylematch_core::config::LoadOptions;
use stylematch_db::DemoCatalog;

use crate::commands::{open_pool, prepare, CommandResult, Failure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let seeded = DemoCatalog::load(&pool).await.map_err(|error| Failure {
            error_class: "seed_execution",
            message: error.to_string(),
            exit_code: 5,
        })?;
        let verification = DemoCatalog::verify(&pool).await.map_err(|error| Failure {
            error_class: "seed_verification",
            message: error.to_string(),
            exit_code: 6,
        })?;
        pool.close().await;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(Failure {
                error_class: "seed_verification",
                message: verification_message(&failed_checks),
                exit_code: 6,
            });
        }
        Ok::<_, Failure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            format!(
                "demo catalog loaded: {} products, users {}",
                seeded.products,
                seeded.users.join(", ")
            ),
            Some(json!({ "products": seeded.products, "users": seeded.users })),
        ),
        Err(failure) => failure.into_result("seed"),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("products", true), ("demo-user", false), ("demo-cold", false)];

        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        assert_eq!(
            verification_message(&failed_checks),
            "Seed verification failed for checks: demo-user, demo-cold"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
