use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use stylematch_core::domain::interaction::Interaction;
use stylematch_core::domain::product::{Product, ProductId};
use stylematch_core::recommend::{
    CandidateFilter, CatalogStore, InteractionStore, PreferenceProfile, ProfileStore, StoreError,
};

#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub async fn insert(&self, product: Product) {
        let mut products = self.products.write().await;
        products.insert(product.id.clone(), product);
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Product>, StoreError> {
        let products = self.products.read().await;
        let mut matching: Vec<Product> =
            products.values().filter(|product| filter.matches(product)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(filter.limit);
        Ok(matching)
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryInteractionLog {
    interactions: RwLock<Vec<Interaction>>,
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryInteractionLog {
    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, StoreError> {
        let interactions = self.interactions.read().await;
        let mut recent: Vec<Interaction> =
            interactions.iter().filter(|i| i.user_id == user_id).cloned().collect();
        // Stable sort keeps insertion order reversed for equal timestamps.
        recent.reverse();
        recent.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let interactions = self.interactions.read().await;
        Ok(interactions.iter().filter(|i| i.user_id == user_id).count() as u64)
    }

    async fn answered_product_ids(&self, user_id: &str) -> Result<HashSet<ProductId>, StoreError> {
        let interactions = self.interactions.read().await;
        Ok(interactions
            .iter()
            .filter(|i| i.user_id == user_id && i.outcome.is_answer())
            .map(|i| i.product_id.clone())
            .collect())
    }

    async fn append(&self, interaction: &Interaction) -> Result<(), StoreError> {
        let mut interactions = self.interactions.write().await;
        interactions.push(interaction.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, PreferenceProfile>>,
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileRepository {
    async fn load(&self, user_id: &str) -> Result<Option<PreferenceProfile>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, profile: &PreferenceProfile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(user_id.to_string(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use stylematch_core::domain::interaction::{Interaction, Outcome};
    use stylematch_core::domain::product::Product;
    use stylematch_core::recommend::{
        CandidateFilter, CatalogStore, EngineConfig, ExplorePolicy, InteractionStore,
        ProfileStore, RecommendationEngine, RecommendationRequest, Strategy,
    };

    use super::{InMemoryCatalog, InMemoryInteractionLog, InMemoryProfileRepository};

    fn at(minutes: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp")
            + Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn catalog_applies_filter_and_newest_first_limit() {
        let catalog = InMemoryCatalog::default();
        catalog.insert(Product::new("a", "A", at(0))).await;
        catalog.insert(Product::new("b", "B", at(2))).await;
        catalog.insert(Product::new("c", "C", at(1)).inactive()).await;

        let found =
            catalog.fetch_candidates(&CandidateFilter::active(1)).await.expect("fetch candidates");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn interaction_log_orders_and_counts_per_user() {
        let log = InMemoryInteractionLog::default();
        log.append(&Interaction::new("u-1", "a", Outcome::Yes, at(0))).await.expect("append");
        log.append(&Interaction::new("u-1", "b", Outcome::View, at(3))).await.expect("append");
        log.append(&Interaction::new("u-2", "c", Outcome::No, at(4))).await.expect("append");

        let recent = log.recent_for_user("u-1", 10).await.expect("recent");
        assert_eq!(recent[0].product_id.as_str(), "b");
        assert_eq!(log.count_for_user("u-1").await.expect("count"), 2);
        assert_eq!(log.answered_product_ids("u-1").await.expect("answered").len(), 1);
    }

    #[tokio::test]
    async fn in_memory_stores_drive_the_engine_end_to_end() {
        let catalog = Arc::new(InMemoryCatalog::default());
        for (index, category) in ["tops", "shoes", "bags", "tops", "outerwear"].iter().enumerate() {
            let product = Product::new(format!("p-{index}"), "Item", at(index as i64))
                .with_category(*category)
                .with_brand(format!("brand-{index}"))
                .with_price(5_000.0)
                .with_tags(["linen"])
                .with_image(format!("https://img.example/{index}.jpg"))
                .with_reviews(4.0, 10);
            catalog.insert(product).await;
        }
        let log = Arc::new(InMemoryInteractionLog::default());
        let profiles = Arc::new(InMemoryProfileRepository::default());

        let config = EngineConfig {
            noise_ratio: 0.0,
            explore: ExplorePolicy { initial_rate: 0.0, floor: 0.0, ..ExplorePolicy::default() },
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::new(catalog, log.clone(), config)
            .with_profile_store(profiles.clone());

        engine
            .record_interaction(Interaction::new("u-1", "p-0", Outcome::Yes, at(10)))
            .await
            .expect("record interaction");

        let mut rng = StdRng::seed_from_u64(7);
        let result =
            engine.recommend(RecommendationRequest::new("u-1").with_limit(3), &mut rng).await;

        assert_eq!(result.strategy, Strategy::Personalized);
        assert_eq!(result.products.len(), 3);
        assert!(result.products.iter().all(|p| p.id.as_str() != "p-0"));
        assert!(profiles.load("u-1").await.expect("load profile").is_some());
    }
}
