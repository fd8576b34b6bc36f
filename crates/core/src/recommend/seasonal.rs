//! Calendar-driven signals: season keyword matching and contextual tag boosts.

use std::collections::HashMap;

use crate::domain::context::{ContextInfo, DayKind, Season, TimeOfDay};
use crate::domain::product::Product;

pub const ALL_SEASON_TAG: &str = "all-season";

const SPRING_KEYWORDS: &[&str] = &["spring", "light", "pastel"];
const SUMMER_KEYWORDS: &[&str] = &["summer", "cool", "short-sleeve", "sandals"];
const AUTUMN_KEYWORDS: &[&str] = &["autumn", "outerwear", "brown"];
const WINTER_KEYWORDS: &[&str] = &["winter", "warm", "knit", "coat"];

const WEEKEND_BOOSTS: &[(&str, f64)] =
    &[("casual", 1.3), ("date", 1.2), ("relaxed", 1.2), ("sport", 1.1)];
const WEEKDAY_BOOSTS: &[(&str, f64)] =
    &[("business", 1.3), ("office", 1.2), ("formal", 1.1), ("smart", 1.1)];
const MORNING_BOOSTS: &[(&str, f64)] = &[("commute", 1.2), ("business", 1.1)];
const EVENING_BOOSTS: &[(&str, f64)] = &[("dinner", 1.3), ("party", 1.2), ("date", 1.2)];
const NIGHT_BOOSTS: &[(&str, f64)] = &[("loungewear", 1.2), ("relaxed", 1.3)];
const SPRING_BOOSTS: &[(&str, f64)] = &[("light", 1.3), ("pastel", 1.2), ("floral", 1.1)];
const SUMMER_BOOSTS: &[(&str, f64)] =
    &[("cool", 1.5), ("short-sleeve", 1.4), ("linen", 1.3), ("sandals", 1.2)];
const AUTUMN_BOOSTS: &[(&str, f64)] = &[("outerwear", 1.3), ("brown", 1.2), ("check", 1.1)];
const WINTER_BOOSTS: &[(&str, f64)] =
    &[("warm", 1.5), ("knit", 1.4), ("coat", 1.3), ("boots", 1.2)];

pub fn season_keywords(season: Season) -> &'static [&'static str] {
    match season {
        Season::Spring => SPRING_KEYWORDS,
        Season::Summer => SUMMER_KEYWORDS,
        Season::Autumn => AUTUMN_KEYWORDS,
        Season::Winter => WINTER_KEYWORDS,
    }
}

/// Keywords match whole hyphen or space separated tokens, so `wool-coat`
/// is a winter tag but `petticoat` is not.
fn matches_season(tag: &str, season: Season) -> bool {
    let bounded = format!("-{}-", tag.split_whitespace().collect::<Vec<_>>().join("-"));
    season_keywords(season).iter().any(|keyword| bounded.contains(&format!("-{keyword}-")))
}

/// Seasonal fit of a product for the current season.
///
/// 1.0 neutral, 1.2 for all-season items, 1.5 plus 0.2 per matching tag
/// (capped at 2.0) for in-season items, 0.5 for opposing-season items.
pub fn seasonal_score(product: &Product, season: Season) -> f64 {
    let matching = product.tags.iter().filter(|tag| matches_season(tag, season)).count();
    if matching > 0 {
        return (1.5 + 0.2 * matching as f64).min(2.0);
    }
    if product.has_tag(ALL_SEASON_TAG) {
        return 1.2;
    }
    let opposing = season.opposing();
    if product.tags.iter().any(|tag| matches_season(tag, opposing)) {
        return 0.5;
    }
    1.0
}

/// Tag multipliers in [1.0, 1.5] for a calendar context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextBoosts {
    multipliers: HashMap<&'static str, f64>,
}

impl ContextBoosts {
    pub fn for_context(context: &ContextInfo) -> Self {
        let day = match context.day_kind {
            DayKind::Weekend => WEEKEND_BOOSTS,
            DayKind::Weekday => WEEKDAY_BOOSTS,
        };
        let time: &[(&str, f64)] = match context.time_of_day {
            TimeOfDay::Morning => MORNING_BOOSTS,
            TimeOfDay::Afternoon => &[],
            TimeOfDay::Evening => EVENING_BOOSTS,
            TimeOfDay::Night => NIGHT_BOOSTS,
        };
        let season = match context.season {
            Season::Spring => SPRING_BOOSTS,
            Season::Summer => SUMMER_BOOSTS,
            Season::Autumn => AUTUMN_BOOSTS,
            Season::Winter => WINTER_BOOSTS,
        };

        let mut multipliers = HashMap::new();
        for (tag, factor) in day.iter().chain(time).chain(season) {
            let entry = multipliers.entry(*tag).or_insert(1.0_f64);
            *entry = entry.max(*factor);
        }
        Self { multipliers }
    }

    pub fn multiplier(&self, tag: &str) -> f64 {
        self.multipliers.get(tag).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{seasonal_score, ContextBoosts};
    use crate::domain::context::{ContextInfo, DayKind, Season, TimeOfDay};
    use crate::domain::product::Product;

    fn tagged(tags: &[&str]) -> Product {
        Product::new("p", "item", Utc::now()).with_tags(tags.iter().copied())
    }

    #[test]
    fn in_season_items_are_boosted_and_capped() {
        assert!((seasonal_score(&tagged(&["summer"]), Season::Summer) - 1.7).abs() < 1e-9);
        let many = tagged(&["summer", "cool", "short-sleeve", "sandals"]);
        assert_eq!(seasonal_score(&many, Season::Summer), 2.0);
    }

    #[test]
    fn opposing_season_is_penalized_and_others_are_neutral() {
        assert_eq!(seasonal_score(&tagged(&["knit"]), Season::Summer), 0.5);
        assert_eq!(seasonal_score(&tagged(&["pastel"]), Season::Summer), 1.0);
        assert_eq!(seasonal_score(&tagged(&[]), Season::Winter), 1.0);
        assert_eq!(seasonal_score(&tagged(&["all-season"]), Season::Winter), 1.2);
    }

    #[test]
    fn season_keywords_match_whole_tokens_only() {
        assert_eq!(seasonal_score(&tagged(&["petticoat"]), Season::Winter), 1.0);
        assert_eq!(seasonal_score(&tagged(&["highlight"]), Season::Spring), 1.0);
        assert_eq!(seasonal_score(&tagged(&["cooling"]), Season::Summer), 1.0);

        assert!(seasonal_score(&tagged(&["coat"]), Season::Winter) > 1.5);
        assert!(seasonal_score(&tagged(&["wool-coat"]), Season::Winter) > 1.5);
        assert!(seasonal_score(&tagged(&["short-sleeve"]), Season::Summer) > 1.5);
        assert!(seasonal_score(&tagged(&["light blue"]), Season::Spring) > 1.5);
    }

    #[test]
    fn overlapping_contexts_keep_the_largest_multiplier() {
        let context = ContextInfo {
            day_kind: DayKind::Weekday,
            time_of_day: TimeOfDay::Morning,
            season: Season::Winter,
        };
        let boosts = ContextBoosts::for_context(&context);

        assert_eq!(boosts.multiplier("business"), 1.3);
        assert_eq!(boosts.multiplier("warm"), 1.5);
        assert_eq!(boosts.multiplier("sandals"), 1.0);
    }
}
