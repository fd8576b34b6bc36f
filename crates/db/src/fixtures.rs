use sqlx::Executor;
use tracing::info;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_USERS: &[DemoUser] = &[
    DemoUser { user_id: "demo-user", interaction_count: 12, answered_count: 9 },
    DemoUser { user_id: "demo-cold", interaction_count: 2, answered_count: 2 },
];

const PRODUCT_COUNT: i64 = 36;
const ACTIVE_PRODUCT_COUNT: i64 = 35;
const PRODUCT_ID_PREFIX: &str = "demo-p-";

#[derive(Debug, Clone, Copy)]
struct DemoUser {
    user_id: &'static str,
    interaction_count: i64,
    answered_count: i64,
}

/// Deterministic demo catalog with two users at different profile maturity.
///
/// `demo-user` has a warming history with clear category and brand signals;
/// `demo-cold` has two swipes and exercises the cold-start weights.
pub struct DemoCatalog;

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Loads the catalog. Products upsert and demo interactions are replaced,
    /// so repeated loads converge on the same state.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        info!(
            event_name = "fixtures.demo_catalog.loaded",
            products = PRODUCT_COUNT,
            users = DEMO_USERS.len(),
            "demo catalog loaded"
        );

        Ok(SeedResult {
            products: PRODUCT_COUNT as usize,
            users: DEMO_USERS.iter().map(|user| user.user_id).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let products: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM product WHERE id LIKE ?1")
            .bind(format!("{PRODUCT_ID_PREFIX}%"))
            .fetch_one(pool)
            .await?;
        checks.push(("products", products == PRODUCT_COUNT));

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM product WHERE id LIKE ?1 AND is_active = 1",
        )
        .bind(format!("{PRODUCT_ID_PREFIX}%"))
        .fetch_one(pool)
        .await?;
        checks.push(("active-products", active == ACTIVE_PRODUCT_COUNT));

        for user in DEMO_USERS {
            let interactions: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM interaction WHERE user_id = ?1")
                    .bind(user.user_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((user.user_id, interactions == user.interaction_count));

            let answered: i64 = sqlx::query_scalar(
                "SELECT COUNT(DISTINCT product_id) FROM interaction
                 WHERE user_id = ?1 AND outcome IN ('yes', 'no')",
            )
            .bind(user.user_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.user_id, answered == user.answered_count));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for user in DEMO_USERS {
            sqlx::query("DELETE FROM interaction WHERE user_id = ?1")
                .bind(user.user_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM preference_profile WHERE user_id = ?1")
                .bind(user.user_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM product WHERE id LIKE ?1")
            .bind(format!("{PRODUCT_ID_PREFIX}%"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub products: usize,
    pub users: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
