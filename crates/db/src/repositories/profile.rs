use async_trait::async_trait;
use sqlx::Row;

use stylematch_core::recommend::{PreferenceProfile, ProfileStore, StoreError};

use super::{decode_err, RepositoryError};
use crate::DbPool;

/// Persists the last built profile per user as a JSON document.
pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find(&self, user_id: &str) -> Result<Option<PreferenceProfile>, RepositoryError> {
        let row = sqlx::query("SELECT profile_json FROM preference_profile WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("profile_json").map_err(decode_err)?;
        let profile = serde_json::from_str(&json).map_err(|e| {
            RepositoryError::Decode(format!("invalid profile_json for {user_id}: {e}"))
        })?;
        Ok(Some(profile))
    }

    async fn upsert(
        &self,
        user_id: &str,
        profile: &PreferenceProfile,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(profile).map_err(decode_err)?;
        sqlx::query(
            "INSERT INTO preference_profile (user_id, profile_json, interaction_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                profile_json = excluded.profile_json,
                interaction_count = excluded.interaction_count,
                updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(json)
        .bind(i64::try_from(profile.interaction_count).unwrap_or(i64::MAX))
        .bind(profile.built_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqlProfileRepository {
    async fn load(&self, user_id: &str) -> Result<Option<PreferenceProfile>, StoreError> {
        Ok(self.find(user_id).await?)
    }

    async fn save(&self, user_id: &str, profile: &PreferenceProfile) -> Result<(), StoreError> {
        Ok(self.upsert(user_id, profile).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use stylematch_core::domain::product::PriceBucket;
    use stylematch_core::recommend::{PreferenceProfile, ProfileStore, StoreError};

    use super::SqlProfileRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlProfileRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlProfileRepository::new(pool)
    }

    fn profile(count: usize) -> PreferenceProfile {
        let built_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp");
        let mut profile = PreferenceProfile::empty(built_at);
        profile.tag_scores.insert("linen".to_string(), 2.5);
        profile.price_bucket_scores.insert(PriceBucket::Mid, 1.0);
        profile.disliked_brands.insert("loudco".to_string());
        profile.interaction_count = count;
        profile
    }

    #[tokio::test]
    async fn missing_profile_loads_as_none() {
        let repo = repository().await;
        assert_eq!(repo.load("nobody").await, Ok(None));
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let repo = repository().await;
        repo.save("u-1", &profile(3)).await.expect("first save");
        repo.save("u-1", &profile(12)).await.expect("second save");

        let loaded = repo.load("u-1").await.expect("load").expect("profile present");
        assert_eq!(loaded, profile(12));
    }

    #[tokio::test]
    async fn corrupt_document_surfaces_decode_error() {
        let repo = repository().await;
        sqlx::query(
            "INSERT INTO preference_profile (user_id, profile_json, updated_at)
             VALUES ('u-bad', '{not json', '2026-03-01T09:00:00+00:00')",
        )
        .execute(&repo.pool)
        .await
        .expect("insert corrupt row");

        assert!(matches!(repo.load("u-bad").await, Err(StoreError::Decode(_))));
    }
}
