//! Diversity-constrained selection over score-sorted candidates.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::product::{PriceBucket, Product};
use crate::domain::style::{style_labels, StyleBucket};

use super::scoring::ScoredCandidate;
use super::{
    DEFAULT_WINDOW_SIZE, MAX_SAME_BRAND, MAX_SAME_CATEGORY, MAX_SAME_PRICE_RANGE, MAX_SAME_STYLE,
};

/// Repetition caps inside the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityCaps {
    pub window_size: usize,
    pub max_same_category: usize,
    pub max_same_brand: usize,
    pub max_same_price_range: usize,
    pub max_same_style: usize,
    /// Opening slots that allow no repeated category or brand in the window.
    pub front_load_slots: usize,
}

impl Default for DiversityCaps {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_same_category: MAX_SAME_CATEGORY,
            max_same_brand: MAX_SAME_BRAND,
            max_same_price_range: MAX_SAME_PRICE_RANGE,
            max_same_style: MAX_SAME_STYLE,
            front_load_slots: 0,
        }
    }
}

impl DiversityCaps {
    pub fn with_max_same_category(mut self, cap: usize) -> Self {
        self.max_same_category = cap;
        self
    }
}

struct WindowEntry {
    category: Option<String>,
    brand: Option<String>,
    bucket: PriceBucket,
    styles: Vec<StyleBucket>,
}

impl WindowEntry {
    fn of(product: &Product) -> Self {
        Self {
            category: product.category_key(),
            brand: product.brand_key(),
            bucket: product.price_bucket(),
            styles: style_labels(product),
        }
    }
}

/// Selection result; the first `admitted` products passed the window caps,
/// the rest were backfilled.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub products: Vec<Product>,
    pub admitted: usize,
}

impl Selection {
    pub fn backfilled(&self) -> usize {
        self.products.len() - self.admitted
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiversitySelector {
    caps: DiversityCaps,
}

impl DiversitySelector {
    pub fn new(caps: DiversityCaps) -> Self {
        Self { caps }
    }

    pub fn caps(&self) -> &DiversityCaps {
        &self.caps
    }

    /// Selects from candidates already sorted by descending score and strips
    /// the scores.
    pub fn select(&self, scored: Vec<ScoredCandidate>, limit: usize) -> Vec<Product> {
        let ranked = scored.into_iter().map(|candidate| candidate.product).collect();
        self.select_products(ranked, limit)
    }

    pub fn select_products(&self, ranked: Vec<Product>, limit: usize) -> Vec<Product> {
        self.select_detailed(ranked, limit).products
    }

    /// One greedy pass under the window caps, then a backfill of skipped
    /// items in their original order. Never returns more than `limit`.
    pub fn select_detailed(&self, ranked: Vec<Product>, limit: usize) -> Selection {
        if limit == 0 {
            return Selection { products: Vec::new(), admitted: 0 };
        }

        let window_size = self.caps.window_size.max(1);
        let mut window: VecDeque<WindowEntry> = VecDeque::with_capacity(window_size + 1);
        let mut selected = Vec::with_capacity(limit.min(ranked.len()));
        let mut skipped = Vec::new();

        for product in ranked {
            if selected.len() == limit {
                skipped.push(product);
                continue;
            }
            let entry = WindowEntry::of(&product);
            let strict = selected.len() < self.caps.front_load_slots;
            if self.admits(&window, &entry, strict) {
                window.push_back(entry);
                if window.len() > window_size {
                    window.pop_front();
                }
                selected.push(product);
            } else {
                skipped.push(product);
            }
        }

        let admitted = selected.len();
        let needed = limit.saturating_sub(admitted);
        selected.extend(skipped.into_iter().take(needed));
        Selection { products: selected, admitted }
    }

    fn admits(&self, window: &VecDeque<WindowEntry>, entry: &WindowEntry, strict: bool) -> bool {
        let category_cap = if strict { 1 } else { self.caps.max_same_category };
        let brand_cap = if strict { 1 } else { self.caps.max_same_brand };

        if let Some(category) = &entry.category {
            let seen = window.iter().filter(|e| e.category.as_ref() == Some(category)).count();
            if seen >= category_cap {
                return false;
            }
        }
        if let Some(brand) = &entry.brand {
            let seen = window.iter().filter(|e| e.brand.as_ref() == Some(brand)).count();
            if seen >= brand_cap {
                return false;
            }
        }
        if entry.bucket != PriceBucket::Unknown {
            let seen = window.iter().filter(|e| e.bucket == entry.bucket).count();
            if seen >= self.caps.max_same_price_range {
                return false;
            }
        }
        if !entry.styles.is_empty() {
            let seen = window
                .iter()
                .filter(|e| e.styles.iter().any(|style| entry.styles.contains(style)))
                .count();
            if seen >= self.caps.max_same_style {
                return false;
            }
        }
        true
    }
}

/// Mean of the distinct-category, distinct-brand and distinct-style ratios.
/// Lists shorter than two items count as fully diverse.
pub fn diversity_score(products: &[Product]) -> f64 {
    if products.len() < 2 {
        return 1.0;
    }
    let total = products.len() as f64;
    let categories: BTreeSet<String> =
        products.iter().map(|p| p.category_key().unwrap_or_default()).collect();
    let brands: BTreeSet<String> =
        products.iter().map(|p| p.brand_key().unwrap_or_default()).collect();
    let styles: BTreeSet<StyleBucket> = products.iter().map(StyleBucket::classify).collect();

    (categories.len() as f64 / total + brands.len() as f64 / total + styles.len() as f64 / total)
        / 3.0
}
