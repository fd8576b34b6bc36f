//! Fixed style buckets and keyword classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::product::{normalize_label, Product};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleBucket {
    Casual,
    Street,
    Mode,
    Natural,
    Classic,
    Feminine,
}

/// Tie-break order when two buckets score the same.
const PRIORITY: [StyleBucket; 6] = [
    StyleBucket::Classic,
    StyleBucket::Mode,
    StyleBucket::Feminine,
    StyleBucket::Natural,
    StyleBucket::Street,
    StyleBucket::Casual,
];

const CASUAL_KEYWORDS: &[(&str, u32)] = &[
    ("casual", 3),
    ("daily", 2),
    ("relaxed", 2),
    ("loose", 2),
    ("americana", 2),
    ("denim", 1),
    ("t-shirt", 1),
    ("sneakers", 1),
];

const STREET_KEYWORDS: &[(&str, u32)] = &[
    ("street", 3),
    ("skater", 2),
    ("hip-hop", 2),
    ("graphic", 1),
    ("oversized", 1),
    ("cap", 1),
];

const MODE_KEYWORDS: &[(&str, u32)] = &[
    ("mode", 3),
    ("modern", 2),
    ("minimal", 2),
    ("simple", 1),
    ("monotone", 1),
    ("black", 1),
];

const NATURAL_KEYWORDS: &[(&str, u32)] = &[
    ("natural", 3),
    ("organic", 2),
    ("earthy", 2),
    ("linen", 1),
    ("cotton", 1),
    ("beige", 1),
];

const CLASSIC_KEYWORDS: &[(&str, u32)] = &[
    ("classic", 3),
    ("smart", 3),
    ("office", 2),
    ("business", 2),
    ("formal", 2),
    ("trad", 2),
    ("elegant", 2),
    ("jacket", 1),
    ("blouse", 1),
];

const FEMININE_KEYWORDS: &[(&str, u32)] = &[
    ("feminine", 3),
    ("girly", 2),
    ("cute", 2),
    ("lovely", 2),
    ("dress", 1),
    ("skirt", 1),
    ("frill", 1),
    ("lace", 1),
    ("pink", 1),
];

impl StyleBucket {
    pub const ALL: [StyleBucket; 6] = [
        StyleBucket::Casual,
        StyleBucket::Street,
        StyleBucket::Mode,
        StyleBucket::Natural,
        StyleBucket::Classic,
        StyleBucket::Feminine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Street => "street",
            Self::Mode => "mode",
            Self::Natural => "natural",
            Self::Classic => "classic",
            Self::Feminine => "feminine",
        }
    }

    fn keywords(&self) -> &'static [(&'static str, u32)] {
        match self {
            Self::Casual => CASUAL_KEYWORDS,
            Self::Street => STREET_KEYWORDS,
            Self::Mode => MODE_KEYWORDS,
            Self::Natural => NATURAL_KEYWORDS,
            Self::Classic => CLASSIC_KEYWORDS,
            Self::Feminine => FEMININE_KEYWORDS,
        }
    }

    fn priority(&self) -> usize {
        PRIORITY.iter().position(|bucket| bucket == self).unwrap_or(PRIORITY.len())
    }

    /// The single bucket a product belongs to. An explicit style label wins.
    pub fn classify(product: &Product) -> Self {
        if let Some(explicit) = explicit_style(product) {
            return explicit;
        }
        ranked_matches(product).first().map(|(bucket, _)| *bucket).unwrap_or(Self::Casual)
    }
}

impl std::str::FromStr for StyleBucket {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_label(value);
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.as_str() == normalized)
            .ok_or(DomainError::InvalidStyle(normalized))
    }
}

/// Up to two style labels for the diversity window: the explicit label first,
/// then keyword matches by descending weight. Unmatched products get none.
pub fn style_labels(product: &Product) -> Vec<StyleBucket> {
    let mut labels = Vec::with_capacity(2);
    if let Some(explicit) = explicit_style(product) {
        labels.push(explicit);
    }
    for (bucket, _) in ranked_matches(product) {
        if labels.len() == 2 {
            break;
        }
        if !labels.contains(&bucket) {
            labels.push(bucket);
        }
    }
    labels
}

fn explicit_style(product: &Product) -> Option<StyleBucket> {
    product.style.as_deref().and_then(|label| label.parse().ok())
}

fn ranked_matches(product: &Product) -> Vec<(StyleBucket, u32)> {
    let mut scores: BTreeMap<StyleBucket, u32> = BTreeMap::new();

    for tag in &product.tags {
        for bucket in StyleBucket::ALL {
            for (keyword, weight) in bucket.keywords() {
                if tag.contains(keyword) {
                    *scores.entry(bucket).or_insert(0) += weight;
                }
            }
        }
    }

    if let Some(category) = product.category_key() {
        if category.contains("dress") || category.contains("skirt") {
            *scores.entry(StyleBucket::Feminine).or_insert(0) += 1;
        }
        if category.contains("jacket") || category.contains("suit") {
            *scores.entry(StyleBucket::Classic).or_insert(0) += 1;
        }
        if category.contains("hoodie") || category.contains("sweat") {
            *scores.entry(StyleBucket::Casual).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(StyleBucket, u32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.priority().cmp(&b.0.priority())));
    ranked
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{style_labels, StyleBucket};
    use crate::domain::product::Product;

    fn product(tags: &[&str]) -> Product {
        Product::new("p", "item", Utc::now()).with_tags(tags.iter().copied())
    }

    #[test]
    fn untagged_product_defaults_to_casual() {
        assert_eq!(StyleBucket::classify(&product(&[])), StyleBucket::Casual);
        assert!(style_labels(&product(&[])).is_empty());
    }

    #[test]
    fn heaviest_keyword_bucket_wins() {
        let item = product(&["street", "oversized", "denim"]);
        assert_eq!(StyleBucket::classify(&item), StyleBucket::Street);
    }

    #[test]
    fn ties_resolve_by_priority() {
        // minimal (mode, 2) vs office (classic, 2)
        let item = product(&["minimal", "office"]);
        assert_eq!(StyleBucket::classify(&item), StyleBucket::Classic);
    }

    #[test]
    fn explicit_label_comes_first_and_labels_cap_at_two() {
        let item = product(&["street", "lace", "linen"]).with_style("Mode");
        let labels = style_labels(&item);

        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0], StyleBucket::Mode);
        assert_eq!(labels[1], StyleBucket::Street);
    }

    #[test]
    fn category_hint_breaks_an_empty_match() {
        let item = product(&["blue"]).with_category("Dresses");
        assert_eq!(StyleBucket::classify(&item), StyleBucket::Feminine);
    }
}
