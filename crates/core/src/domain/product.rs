use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A catalog item as seen by the recommendation pipeline.
///
/// Every attribute other than the id, title, creation time and active flag is
/// optional; missing values carry no signal and never fail scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub style: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ProductId::new(id),
            title: title.into(),
            brand: None,
            price: None,
            category: None,
            tags: BTreeSet::new(),
            image_url: None,
            created_at,
            active: true,
            rating: None,
            review_count: None,
            style: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|tag| normalize_label(&tag.into())).collect();
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_reviews(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = Some(review_count);
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn price_bucket(&self) -> PriceBucket {
        PriceBucket::of(self.price)
    }

    /// Normalized category key, if the product has a non-blank category.
    pub fn category_key(&self) -> Option<String> {
        self.category.as_deref().map(normalize_label).filter(|value| !value.is_empty())
    }

    /// Normalized brand key, if the product has a non-blank brand.
    pub fn brand_key(&self) -> Option<String> {
        self.brand.as_deref().map(normalize_label).filter(|value| !value.is_empty())
    }
}

/// Lowercased, trimmed form used for every tag/category/brand key.
pub fn normalize_label(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Coarse price band used by the diversity window and the profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBucket {
    Budget,
    Mid,
    Upper,
    Premium,
    Unknown,
}

impl PriceBucket {
    pub fn of(price: Option<f64>) -> Self {
        match price {
            Some(value) if !value.is_finite() || value < 0.0 => Self::Unknown,
            Some(value) if value < 3_000.0 => Self::Budget,
            Some(value) if value < 10_000.0 => Self::Mid,
            Some(value) if value < 30_000.0 => Self::Upper,
            Some(_) => Self::Premium,
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Mid => "mid",
            Self::Upper => "upper",
            Self::Premium => "premium",
            Self::Unknown => "unknown",
        }
    }
}
