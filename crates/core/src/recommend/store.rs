//! Boundary traits for the stores the pipeline reads from.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::interaction::Interaction;
use crate::domain::product::{normalize_label, Product, ProductId};

use super::profile::PreferenceProfile;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse predicates pushed down to the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateFilter {
    pub active_only: bool,
    pub require_image: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub exclude_brands: BTreeSet<String>,
    pub exclude_categories: BTreeSet<String>,
    pub exclude_ids: BTreeSet<ProductId>,
    /// Candidates must carry at least one of these tags when non-empty.
    pub require_any_tags: BTreeSet<String>,
    pub limit: usize,
}

impl CandidateFilter {
    pub fn active(limit: usize) -> Self {
        Self {
            active_only: true,
            require_image: false,
            min_price: None,
            max_price: None,
            exclude_brands: BTreeSet::new(),
            exclude_categories: BTreeSet::new(),
            exclude_ids: BTreeSet::new(),
            require_any_tags: BTreeSet::new(),
            limit,
        }
    }

    pub fn with_image_required(mut self, required: bool) -> Self {
        self.require_image = required;
        self
    }

    pub fn with_price_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn excluding_brands<I: IntoIterator<Item = String>>(mut self, brands: I) -> Self {
        self.exclude_brands.extend(brands.into_iter().map(|brand| normalize_label(&brand)));
        self
    }

    pub fn excluding_categories<I: IntoIterator<Item = String>>(mut self, categories: I) -> Self {
        self.exclude_categories
            .extend(categories.into_iter().map(|category| normalize_label(&category)));
        self
    }

    pub fn excluding_ids<I: IntoIterator<Item = ProductId>>(mut self, ids: I) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    pub fn requiring_any_tag<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.require_any_tags.extend(tags.into_iter().map(|tag| normalize_label(tag.as_ref())));
        self
    }

    pub fn without_tag_requirement(mut self) -> Self {
        self.require_any_tags.clear();
        self
    }

    /// In-process evaluation of the same predicates a store applies.
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.active {
            return false;
        }
        if self.require_image
            && product.image_url.as_deref().map(str::trim).unwrap_or_default().is_empty()
        {
            return false;
        }
        if self.exclude_ids.contains(&product.id) {
            return false;
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            let Some(price) = product.price else {
                return false;
            };
            if self.min_price.is_some_and(|min| price < min)
                || self.max_price.is_some_and(|max| price > max)
            {
                return false;
            }
        }
        if product.brand_key().is_some_and(|brand| self.exclude_brands.contains(&brand)) {
            return false;
        }
        if product
            .category_key()
            .is_some_and(|category| self.exclude_categories.contains(&category))
        {
            return false;
        }
        if !self.require_any_tags.is_empty()
            && !product.tags.iter().any(|tag| self.require_any_tags.contains(tag))
        {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Unordered batch of at most `filter.limit` candidates.
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Product>, StoreError>;

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Most recent first.
    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, StoreError>;

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Products the user already answered yes or no to.
    async fn answered_product_ids(&self, user_id: &str) -> Result<HashSet<ProductId>, StoreError>;

    async fn append(&self, interaction: &Interaction) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<PreferenceProfile>, StoreError>;

    async fn save(&self, user_id: &str, profile: &PreferenceProfile) -> Result<(), StoreError>;
}
