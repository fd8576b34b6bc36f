use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use stylematch_core::domain::interaction::{Interaction, Outcome};
use stylematch_core::domain::product::ProductId;
use stylematch_core::recommend::{InteractionStore, StoreError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only interaction log.
pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, interaction: &Interaction) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO interaction (user_id, product_id, outcome, response_time_ms, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&interaction.user_id)
        .bind(interaction.product_id.as_str())
        .bind(interaction.outcome.as_str())
        .bind(interaction.response_time_ms.map(i64::from))
        .bind(interaction.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, product_id, outcome, response_time_ms, occurred_at
             FROM interaction
             WHERE user_id = ?1
             ORDER BY occurred_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_interaction).collect()
    }

    async fn count(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interaction WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn answered(&self, user_id: &str) -> Result<HashSet<ProductId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT product_id FROM interaction
             WHERE user_id = ?1 AND outcome IN ('yes', 'no')",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(ProductId::new).collect())
    }
}

fn row_to_interaction(row: &SqliteRow) -> Result<Interaction, RepositoryError> {
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let product_id: String = row.try_get("product_id").map_err(decode_err)?;
    let outcome: String = row.try_get("outcome").map_err(decode_err)?;
    let response_time_ms: Option<i64> = row.try_get("response_time_ms").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    let outcome: Outcome = outcome.parse().map_err(decode_err)?;
    let occurred_at = parse_timestamp("occurred_at", &occurred_at)?;
    let mut interaction = Interaction::new(user_id, product_id, outcome, occurred_at);
    interaction.response_time_ms =
        response_time_ms.map(|millis| u32::try_from(millis.max(0)).unwrap_or(u32::MAX));
    Ok(interaction)
}

#[async_trait]
impl InteractionStore for SqlInteractionRepository {
    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, StoreError> {
        Ok(self.recent(user_id, limit).await?)
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self.count(user_id).await?)
    }

    async fn answered_product_ids(&self, user_id: &str) -> Result<HashSet<ProductId>, StoreError> {
        Ok(self.answered(user_id).await?)
    }

    async fn append(&self, interaction: &Interaction) -> Result<(), StoreError> {
        Ok(self.insert(interaction).await?)
    }
}
