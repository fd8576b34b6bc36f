//! Preference profile construction from interaction history.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::interaction::{Interaction, Outcome};
use crate::domain::product::{PriceBucket, Product, ProductId};
use crate::domain::style::StyleBucket;

use super::{DEFAULT_PRICE_RANGE, STRONG_TAG_BONUS, STRONG_TAG_THRESHOLD};

/// Price band learned from liked items.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub preferred: f64,
}

impl Default for PriceRange {
    fn default() -> Self {
        DEFAULT_PRICE_RANGE
    }
}

impl PriceRange {
    pub fn span(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }
}

/// Coarse history-size bucket that selects the scoring weight row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityBucket {
    Cold,
    Warming,
    Mature,
}

impl MaturityBucket {
    pub fn from_count(interaction_count: usize) -> Self {
        match interaction_count {
            0..=9 => Self::Cold,
            10..=49 => Self::Warming,
            _ => Self::Mature,
        }
    }
}

/// Derived per-user affinities. Scores are signed; positive means liked
/// signal outweighed negative signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub tag_scores: BTreeMap<String, f64>,
    pub category_scores: BTreeMap<String, f64>,
    pub brand_scores: BTreeMap<String, f64>,
    pub price_bucket_scores: BTreeMap<PriceBucket, f64>,
    pub price_range: PriceRange,
    pub style_preferences: BTreeMap<StyleBucket, f64>,
    pub disliked_tags: BTreeSet<String>,
    pub disliked_categories: BTreeSet<String>,
    pub disliked_brands: BTreeSet<String>,
    pub price_sensitivity: f64,
    pub interaction_count: usize,
    pub normalized: bool,
    pub built_at: DateTime<Utc>,
}

impl PreferenceProfile {
    pub fn empty(built_at: DateTime<Utc>) -> Self {
        let price_range = PriceRange::default();
        Self {
            tag_scores: BTreeMap::new(),
            category_scores: BTreeMap::new(),
            brand_scores: BTreeMap::new(),
            price_bucket_scores: BTreeMap::new(),
            price_range,
            style_preferences: BTreeMap::new(),
            disliked_tags: BTreeSet::new(),
            disliked_categories: BTreeSet::new(),
            disliked_brands: BTreeSet::new(),
            price_sensitivity: price_sensitivity(price_range.span(), 0),
            interaction_count: 0,
            normalized: false,
            built_at,
        }
    }

    pub fn maturity(&self) -> MaturityBucket {
        MaturityBucket::from_count(self.interaction_count)
    }

    pub fn is_empty(&self) -> bool {
        self.tag_scores.is_empty()
            && self.category_scores.is_empty()
            && self.brand_scores.is_empty()
    }

    /// The `n` strongest liked tags, ties broken by name.
    pub fn top_tags(&self, n: usize) -> Vec<(String, f64)> {
        let mut liked: Vec<(String, f64)> = self
            .tag_scores
            .iter()
            .filter(|(_, score)| **score > 0.5)
            .map(|(tag, score)| (tag.clone(), *score))
            .collect();
        liked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        liked.truncate(n);
        liked
    }

    pub fn style_affinity(&self, style: StyleBucket) -> f64 {
        self.style_preferences.get(&style).copied().unwrap_or(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileOptions {
    /// Rescale each mapping to [0, 1] after accumulation.
    pub normalize: bool,
    /// Age in days at which an interaction's weight falls to 1/e.
    pub time_decay_days: Option<f64>,
    pub yes_weight: f64,
    pub favorite_weight: f64,
    pub no_weight: f64,
    pub click_weight: f64,
    pub view_weight: f64,
    pub max_counted_views: u32,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            normalize: false,
            time_decay_days: None,
            yes_weight: 1.0,
            favorite_weight: 2.0,
            no_weight: -0.5,
            click_weight: 0.5,
            view_weight: 0.1,
            max_counted_views: 3,
        }
    }
}

/// Aggregates interactions into a [`PreferenceProfile`]. Pure over its inputs.
#[derive(Clone, Debug, Default)]
pub struct ProfileBuilder {
    options: ProfileOptions,
}

impl ProfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ProfileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProfileOptions {
        &self.options
    }

    /// Builds a profile. Interactions whose product is missing from `products`
    /// still count toward the total but contribute no affinity.
    pub fn build(
        &self,
        interactions: &[Interaction],
        products: &HashMap<ProductId, Product>,
        now: DateTime<Utc>,
    ) -> PreferenceProfile {
        self.build_with_total(interactions, products, interactions.len(), now)
    }

    /// Same as [`build`](Self::build) with an externally known history size,
    /// used when `interactions` is only the recent window.
    pub fn build_with_total(
        &self,
        interactions: &[Interaction],
        products: &HashMap<ProductId, Product>,
        total_interactions: usize,
        now: DateTime<Utc>,
    ) -> PreferenceProfile {
        let mut profile = PreferenceProfile::empty(now);
        profile.interaction_count = total_interactions.max(interactions.len());

        let mut style_raw: BTreeMap<StyleBucket, f64> = BTreeMap::new();
        let mut view_counts: HashMap<&ProductId, u32> = HashMap::new();
        let mut liked_prices = Vec::new();

        for interaction in interactions {
            let Some(product) = products.get(&interaction.product_id) else {
                continue;
            };

            let base = match interaction.outcome {
                Outcome::Yes => self.options.yes_weight,
                Outcome::Favorite => self.options.favorite_weight,
                Outcome::No => self.options.no_weight,
                Outcome::Click => self.options.click_weight,
                Outcome::View => {
                    let seen = view_counts.entry(&interaction.product_id).or_insert(0);
                    *seen += 1;
                    if *seen > self.options.max_counted_views {
                        continue;
                    }
                    self.options.view_weight
                }
            };
            let weight = base * self.decay(interaction.occurred_at, now);

            for tag in &product.tags {
                *profile.tag_scores.entry(tag.clone()).or_insert(0.0) += weight;
            }
            if let Some(category) = product.category_key() {
                *profile.category_scores.entry(category).or_insert(0.0) += weight;
            }
            if let Some(brand) = product.brand_key() {
                *profile.brand_scores.entry(brand).or_insert(0.0) += weight;
            }
            let bucket = product.price_bucket();
            if bucket != PriceBucket::Unknown {
                *profile.price_bucket_scores.entry(bucket).or_insert(0.0) += weight;
            }

            let style_delta = match interaction.outcome {
                outcome if outcome.is_positive() => 1.0,
                Outcome::No => -0.5,
                _ => 0.0,
            };
            if style_delta != 0.0 {
                *style_raw.entry(StyleBucket::classify(product)).or_insert(0.0) += style_delta;
            }

            if interaction.outcome.is_positive() {
                let price = product.price.filter(|price| price.is_finite() && *price >= 0.0);
                if let Some(price) = price {
                    liked_prices.push(price);
                }
            }
        }

        for score in profile.tag_scores.values_mut() {
            if *score >= STRONG_TAG_THRESHOLD {
                *score += STRONG_TAG_BONUS;
            }
        }

        profile.disliked_tags = negative_keys(&profile.tag_scores);
        profile.disliked_categories = negative_keys(&profile.category_scores);
        profile.disliked_brands = negative_keys(&profile.brand_scores);

        profile.price_range = price_range(&mut liked_prices);
        profile.price_sensitivity =
            price_sensitivity(profile.price_range.span(), profile.interaction_count);
        profile.style_preferences = normalize_styles(style_raw);

        if self.options.normalize {
            min_max_normalize(&mut profile.tag_scores);
            min_max_normalize(&mut profile.category_scores);
            min_max_normalize(&mut profile.brand_scores);
            min_max_normalize(&mut profile.price_bucket_scores);
            profile.normalized = true;
        }

        profile
    }

    fn decay(&self, occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        match self.options.time_decay_days {
            Some(days) if days > 0.0 => {
                let age_days = (now - occurred_at).num_seconds().max(0) as f64 / 86_400.0;
                (-age_days / days).exp()
            }
            _ => 1.0,
        }
    }
}

fn negative_keys(scores: &BTreeMap<String, f64>) -> BTreeSet<String> {
    scores.iter().filter(|(_, score)| **score < 0.0).map(|(key, _)| key.clone()).collect()
}

/// 10th/90th percentile bounds around the median of liked prices.
fn price_range(prices: &mut [f64]) -> PriceRange {
    if prices.is_empty() {
        return PriceRange::default();
    }
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    PriceRange {
        min: percentile(prices, 0.10),
        max: percentile(prices, 0.90),
        preferred: percentile(prices, 0.50),
    }
}

fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Narrow liked ranges mean a price-sensitive shopper.
fn price_sensitivity(span: f64, interaction_count: usize) -> f64 {
    let base = if span < 5_000.0 {
        0.9
    } else if span < 10_000.0 {
        0.7
    } else if span < 20_000.0 {
        0.5
    } else {
        0.3
    };

    if interaction_count > 100 {
        (base * 1.2_f64).min(1.0)
    } else {
        base
    }
}

/// Rescales against a zero baseline with a unit floor on the range, so a
/// single liked style maps to 1.0 and disliked styles map toward 0.0.
fn normalize_styles(raw: BTreeMap<StyleBucket, f64>) -> BTreeMap<StyleBucket, f64> {
    if raw.is_empty() {
        return raw;
    }
    let low = raw.values().copied().fold(0.0_f64, f64::min);
    let high = raw.values().copied().fold(f64::MIN, f64::max).max(low + 1.0);
    let range = high - low;

    raw.into_iter().map(|(style, value)| (style, ((value - low) / range).clamp(0.0, 1.0))).collect()
}

fn min_max_normalize<K: Ord>(scores: &mut BTreeMap<K, f64>) {
    let Some(min) = scores.values().copied().reduce(f64::min) else {
        return;
    };
    let max = scores.values().copied().fold(min, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return;
    }
    for value in scores.values_mut() {
        *value = (*value - min) / range;
    }
}
