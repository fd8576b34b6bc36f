//! Scoring of candidates against a profile, session and calendar context

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::context::ContextInfo;
use crate::domain::product::Product;
use crate::domain::style::StyleBucket;

use super::profile::{MaturityBucket, PreferenceProfile};
use super::seasonal::{seasonal_score, ContextBoosts};
use super::session::SessionAdjustments;
use super::{
    AVOID_MULTIPLIER, BOOST_MULTIPLIER, DEFAULT_EXPLORE_NOISE_RATIO, DEFAULT_NOISE_RATIO,
    DEFAULT_NOVELTY_BONUS, NEGATIVE_PENALTY_CAP,
};

/// Weights for the sub-scores at one maturity level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub tag: f64,
    pub category: f64,
    pub brand: f64,
    pub price: f64,
    pub seasonal: f64,
    pub popularity: f64,
    pub style: f64,
    /// Share of the negative-signal penalty that is applied.
    pub negative: f64,
}

/// Weight rows indexed by [`MaturityBucket`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub cold: ScoringWeights,
    pub warming: ScoringWeights,
    pub mature: ScoringWeights,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            cold: super::COLD_WEIGHTS,
            warming: super::WARMING_WEIGHTS,
            mature: super::MATURE_WEIGHTS,
        }
    }
}

impl WeightTable {
    pub fn for_bucket(&self, bucket: MaturityBucket) -> ScoringWeights {
        match bucket {
            MaturityBucket::Cold => self.cold,
            MaturityBucket::Warming => self.warming,
            MaturityBucket::Mature => self.mature,
        }
    }

    pub fn for_count(&self, interaction_count: usize) -> ScoringWeights {
        self.for_bucket(MaturityBucket::from_count(interaction_count))
    }
}

/// Everything a score depends on besides the candidate itself.
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    pub profile: &'a PreferenceProfile,
    pub session: &'a SessionAdjustments,
    pub context: ContextInfo,
    pub boosts: ContextBoosts,
    pub exploring: bool,
}

impl<'a> ScoringContext<'a> {
    pub fn new(
        profile: &'a PreferenceProfile,
        session: &'a SessionAdjustments,
        context: ContextInfo,
    ) -> Self {
        let boosts = ContextBoosts::for_context(&context);
        Self { profile, session, context, boosts, exploring: false }
    }

    pub fn exploring(mut self, exploring: bool) -> Self {
        self.exploring = exploring;
        self
    }
}

/// Individual sub-scores for one candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub tag: f64,
    pub category: f64,
    pub brand: f64,
    pub price: f64,
    pub seasonal: f64,
    pub popularity: f64,
    pub style: f64,
    /// Negative-signal penalty in [0, 0.8].
    pub penalty: f64,
    pub novelty: f64,
}

/// A candidate with its transient score. The score never leaves the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub product: Product,
    pub score: f64,
    pub components: ComponentScores,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: WeightTable,
    novelty_bonus: f64,
    noise_ratio: f64,
    explore_noise_ratio: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer {
    pub fn new() -> Self {
        Self {
            weights: WeightTable::default(),
            novelty_bonus: DEFAULT_NOVELTY_BONUS,
            noise_ratio: DEFAULT_NOISE_RATIO,
            explore_noise_ratio: DEFAULT_EXPLORE_NOISE_RATIO,
        }
    }

    pub fn with_weights(weights: WeightTable) -> Self {
        Self { weights, ..Self::new() }
    }

    pub fn with_novelty_bonus(mut self, bonus: f64) -> Self {
        self.novelty_bonus = bonus;
        self
    }

    /// Relative noise amplitude for normal and exploration draws.
    pub fn with_noise(mut self, ratio: f64, explore_ratio: f64) -> Self {
        self.noise_ratio = ratio.max(0.0);
        self.explore_noise_ratio = explore_ratio.max(0.0);
        self
    }

    pub fn without_noise(self) -> Self {
        self.with_noise(0.0, 0.0)
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn components(&self, product: &Product, ctx: &ScoringContext<'_>) -> ComponentScores {
        ComponentScores {
            tag: tag_score(product, ctx),
            category: category_score(product, ctx.profile, ctx.session),
            brand: brand_score(product, ctx.profile, ctx.session),
            price: price_score(product, ctx.profile),
            seasonal: seasonal_score(product, ctx.context.season),
            popularity: popularity_score(product),
            style: ctx.profile.style_affinity(StyleBucket::classify(product)),
            penalty: negative_penalty(product, ctx.profile),
            novelty: if ctx.exploring { self.novelty_bonus } else { 0.0 },
        }
    }

    /// Deterministic score: weighted sum, penalty, then novelty bonus.
    pub fn base_score(
        &self,
        product: &Product,
        ctx: &ScoringContext<'_>,
    ) -> (f64, ComponentScores) {
        let components = self.components(product, ctx);
        let weights = self.weights.for_count(ctx.profile.interaction_count);

        let weighted = components.tag * weights.tag
            + components.category * weights.category
            + components.brand * weights.brand
            + components.price * weights.price
            + components.seasonal * weights.seasonal
            + components.popularity * weights.popularity
            + components.style * weights.style;

        let penalized = weighted * (1.0 - components.penalty * weights.negative);
        (finite_or_zero(penalized + components.novelty), components)
    }

    /// Base score with multiplicative jitter `score + U(-e, e) * score`.
    pub fn score<R: Rng + ?Sized>(
        &self,
        product: &Product,
        ctx: &ScoringContext<'_>,
        rng: &mut R,
    ) -> ScoredCandidate {
        let (base, components) = self.base_score(product, ctx);
        let ratio = if ctx.exploring { self.explore_noise_ratio } else { self.noise_ratio };
        let score = if ratio > 0.0 {
            finite_or_zero(base + rng.gen_range(-ratio..=ratio) * base)
        } else {
            base
        };
        ScoredCandidate { product: product.clone(), score, components }
    }

    /// Scores every candidate and sorts descending; equal scores keep input order.
    pub fn score_all<R: Rng + ?Sized>(
        &self,
        candidates: &[Product],
        ctx: &ScoringContext<'_>,
        rng: &mut R,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> =
            candidates.iter().map(|product| self.score(product, ctx, rng)).collect();
        sort_descending(&mut scored);
        scored
    }
}

pub(crate) fn sort_descending(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Mean profile affinity over the candidate's tags, each modulated by the
/// session and calendar context.
pub fn tag_score(product: &Product, ctx: &ScoringContext<'_>) -> f64 {
    if product.tags.is_empty() {
        return 0.0;
    }
    let total: f64 = product
        .tags
        .iter()
        .map(|tag| {
            let mut score = ctx.profile.tag_scores.get(tag).copied().unwrap_or(0.0);
            if ctx.session.avoid_tags.contains(tag) {
                score *= AVOID_MULTIPLIER;
            } else if ctx.session.boost_tags.contains(tag) {
                score *= BOOST_MULTIPLIER;
            }
            score * ctx.boosts.multiplier(tag)
        })
        .sum();
    total / product.tags.len() as f64
}

pub fn category_score(
    product: &Product,
    profile: &PreferenceProfile,
    session: &SessionAdjustments,
) -> f64 {
    let Some(category) = product.category_key() else {
        return 0.0;
    };
    if session.avoid_categories.contains(&category)
        || profile.disliked_categories.contains(&category)
    {
        return 0.0;
    }
    let score = membership(&profile.category_scores, &category);
    if session.boost_categories.contains(&category) {
        score * BOOST_MULTIPLIER
    } else {
        score
    }
}

pub fn brand_score(
    product: &Product,
    profile: &PreferenceProfile,
    session: &SessionAdjustments,
) -> f64 {
    let Some(brand) = product.brand_key() else {
        return 0.0;
    };
    if session.avoid_brands.contains(&brand) || profile.disliked_brands.contains(&brand) {
        return 0.0;
    }
    let score = membership(&profile.brand_scores, &brand);
    if session.boost_brands.contains(&brand) {
        score * BOOST_MULTIPLIER
    } else {
        score
    }
}

/// Positive affinity relative to the strongest positive entry, in [0, 1].
fn membership(scores: &std::collections::BTreeMap<String, f64>, key: &str) -> f64 {
    let score = scores.get(key).copied().unwrap_or(0.0);
    if score <= 0.0 {
        return 0.0;
    }
    let top = scores.values().copied().fold(0.0_f64, f64::max);
    if top <= 0.0 {
        0.0
    } else {
        score / top
    }
}

/// Gaussian around the preferred price with spread (max - min) / 4. Prices
/// outside the range fall off smoothly; a missing price carries no signal.
pub fn price_score(product: &Product, profile: &PreferenceProfile) -> f64 {
    let Some(price) = product.price.filter(|price| price.is_finite()) else {
        return 0.0;
    };
    let range = profile.price_range;
    let mut sigma = (range.max - range.min) / 4.0;
    if !sigma.is_finite() || sigma <= 0.0 {
        sigma = (range.preferred.abs() * 0.25).max(1.0);
    }
    let distance = price - range.preferred;
    finite_or_zero((-(distance * distance) / (2.0 * sigma * sigma)).exp())
}

/// Rating share times log-scaled review count.
pub fn popularity_score(product: &Product) -> f64 {
    let reviews = product.review_count.unwrap_or(0);
    if reviews == 0 {
        return 0.0;
    }
    let rating = product.rating.filter(|rating| rating.is_finite()).unwrap_or(0.0).clamp(0.0, 5.0);
    (rating / 5.0) * ((f64::from(reviews) + 1.0).ln() / 10.0)
}

/// 0.3 per disliked tag, 0.4 for a disliked category and for a disliked
/// brand, capped at 0.8.
pub fn negative_penalty(product: &Product, profile: &PreferenceProfile) -> f64 {
    let tag_hits = product.tags.iter().filter(|tag| profile.disliked_tags.contains(*tag)).count();
    let mut penalty = 0.3 * tag_hits as f64;
    let disliked_category = product
        .category_key()
        .is_some_and(|category| profile.disliked_categories.contains(&category));
    if disliked_category {
        penalty += 0.4;
    }
    if product.brand_key().is_some_and(|brand| profile.disliked_brands.contains(&brand)) {
        penalty += 0.4;
    }
    penalty.min(NEGATIVE_PENALTY_CAP)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::domain::context::{DayKind, Season, TimeOfDay};
    use crate::recommend::profile::PriceRange;

    fn context() -> ContextInfo {
        ContextInfo {
            day_kind: DayKind::Weekday,
            time_of_day: TimeOfDay::Afternoon,
            season: Season::Spring,
        }
    }

    fn profile() -> PreferenceProfile {
        let mut profile = PreferenceProfile::empty(
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).single().expect("valid timestamp"),
        );
        profile.tag_scores = BTreeMap::from([("streetwear".to_string(), 5.0)]);
        profile.interaction_count = 60;
        profile
    }

    fn item(id: &str, tags: &[&str]) -> Product {
        Product::new(id, "item", Utc::now()).with_tags(tags.iter().copied())
    }

    #[test]
    fn matching_tag_outranks_unrelated_tag() {
        let profile = profile();
        let session = SessionAdjustments::default();
        let ctx = ScoringContext::new(&profile, &session, context());
        let scorer = Scorer::new().without_noise();

        let matching = item("a", &["streetwear", "denim"]);
        let unrelated = item("b", &["velvet", "denim"]);

        assert!(tag_score(&matching, &ctx) > 0.0);
        let ranked = scorer.score_all(&[unrelated, matching], &ctx, &mut StdRng::seed_from_u64(7));
        assert_eq!(ranked[0].product.id.as_str(), "a");
    }

    #[test]
    fn session_avoid_and_boost_modulate_tag_score() {
        let profile = profile();
        let mut session = SessionAdjustments::default();
        let product = item("a", &["streetwear"]);

        let plain = tag_score(&product, &ScoringContext::new(&profile, &session, context()));
        session.avoid_tags.insert("streetwear".to_string());
        let avoided = tag_score(&product, &ScoringContext::new(&profile, &session, context()));
        session.avoid_tags.clear();
        session.boost_tags.insert("streetwear".to_string());
        let boosted = tag_score(&product, &ScoringContext::new(&profile, &session, context()));

        assert!((avoided - plain * 0.3).abs() < 1e-9);
        assert!((boosted - plain * 1.5).abs() < 1e-9);
    }

    #[test]
    fn price_at_preferred_scores_one() {
        let mut profile = profile();
        profile.price_range = PriceRange { min: 4_000.0, max: 12_000.0, preferred: 8_000.0 };

        let exact = item("a", &[]).with_price(8_000.0);
        let outside = item("b", &[]).with_price(20_000.0);

        assert!((price_score(&exact, &profile) - 1.0).abs() < 1e-12);
        let far = price_score(&outside, &profile);
        assert!(far > 0.0 && far < 0.01);
        assert_eq!(price_score(&item("c", &[]), &profile), 0.0);
    }

    #[test]
    fn degenerate_price_range_still_peaks_at_preferred() {
        let mut profile = profile();
        profile.price_range = PriceRange { min: 5_000.0, max: 5_000.0, preferred: 5_000.0 };

        assert!((price_score(&item("a", &[]).with_price(5_000.0), &profile) - 1.0).abs() < 1e-12);
        assert!(price_score(&item("b", &[]).with_price(6_000.0), &profile) < 1.0);
    }

    #[test]
    fn disliked_brand_is_zeroed_and_penalized() {
        let mut profile = profile();
        profile.brand_scores = BTreeMap::from([("glossa".to_string(), -1.0)]);
        profile.disliked_brands.insert("glossa".to_string());
        let session = SessionAdjustments::default();
        let product = item("a", &[]).with_brand("Glossa");

        assert_eq!(brand_score(&product, &profile, &session), 0.0);
        assert!(negative_penalty(&product, &profile) > 0.0);
    }

    #[test]
    fn penalty_is_capped() {
        let mut profile = profile();
        profile.disliked_tags = ["a", "b", "c", "d"].iter().map(|tag| tag.to_string()).collect();
        profile.disliked_categories.insert("suits".to_string());

        let product = item("x", &["a", "b", "c", "d"]).with_category("Suits");
        assert_eq!(negative_penalty(&product, &profile), 0.8);
    }

    #[test]
    fn category_is_relative_to_strongest_and_zeroed_when_avoided() {
        let mut profile = profile();
        profile.category_scores =
            BTreeMap::from([("tops".to_string(), 4.0), ("shoes".to_string(), 2.0)]);
        let mut session = SessionAdjustments::default();
        let shoes = item("a", &[]).with_category("Shoes");

        assert!((category_score(&shoes, &profile, &session) - 0.5).abs() < 1e-9);
        session.avoid_categories.insert("shoes".to_string());
        assert_eq!(category_score(&shoes, &profile, &session), 0.0);
    }

    #[test]
    fn popularity_needs_reviews() {
        assert_eq!(popularity_score(&item("a", &[])), 0.0);
        let reviewed = item("b", &[]).with_reviews(5.0, 99);
        assert!((popularity_score(&reviewed) - (100.0_f64).ln() / 10.0).abs() < 1e-12);
    }

    #[test]
    fn weight_rows_follow_maturity() {
        let table = WeightTable::default();
        assert_eq!(table.for_count(0), table.cold);
        assert_eq!(table.for_count(10), table.warming);
        assert_eq!(table.for_count(50), table.mature);
        assert!(table.cold.popularity > table.mature.popularity);
        assert!(table.mature.tag > table.cold.tag);
    }

    #[test]
    fn exploration_adds_novelty_bonus() {
        let profile = profile();
        let session = SessionAdjustments::default();
        let scorer = Scorer::new().without_noise();
        let product = item("a", &["streetwear"]);

        let (plain, _) =
            scorer.base_score(&product, &ScoringContext::new(&profile, &session, context()));
        let (explored, components) = scorer.base_score(
            &product,
            &ScoringContext::new(&profile, &session, context()).exploring(true),
        );

        assert!((explored - plain - DEFAULT_NOVELTY_BONUS).abs() < 1e-9);
        assert_eq!(components.novelty, DEFAULT_NOVELTY_BONUS);
    }

    #[test]
    fn noise_stays_within_ratio() {
        let profile = profile();
        let session = SessionAdjustments::default();
        let ctx = ScoringContext::new(&profile, &session, context());
        let scorer = Scorer::new().with_noise(0.3, 0.5);
        let product = item("a", &["streetwear"]);
        let (base, _) = scorer.base_score(&product, &ctx);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            let noisy = scorer.score(&product, &ctx, &mut rng).score;
            assert!((noisy - base).abs() <= base.abs() * 0.3 + 1e-9);
        }
    }

    fn arbitrary_product() -> impl Strategy<Value = Product> {
        (
            prop::collection::vec("[a-z]{1,6}", 0..5),
            prop::option::of("[A-Za-z]{1,6}"),
            prop::option::of("[A-Za-z]{1,6}"),
            prop::option::of(prop_oneof![Just(f64::NAN), Just(f64::INFINITY), 0.0..100_000.0]),
            prop::option::of(prop_oneof![Just(f64::NAN), 0.0..5.0]),
            prop::option::of(0u32..10_000),
        )
            .prop_map(|(tags, brand, category, price, rating, reviews)| {
                let mut product = Product::new("p", "item", Utc::now()).with_tags(tags);
                product.brand = brand;
                product.category = category;
                product.price = price;
                product.rating = rating;
                product.review_count = reviews;
                product
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn scores_are_always_finite(product in arbitrary_product(), seed in any::<u64>()) {
            let profile = profile();
            let session = SessionAdjustments::default();
            let ctx = ScoringContext::new(&profile, &session, context()).exploring(seed % 2 == 0);
            let scored = Scorer::new().score(&product, &ctx, &mut StdRng::seed_from_u64(seed));
            prop_assert!(scored.score.is_finite());
        }

        #[test]
        fn noiseless_scoring_is_repeatable(product in arbitrary_product()) {
            let profile = profile();
            let session = SessionAdjustments::default();
            let ctx = ScoringContext::new(&profile, &session, context());
            let scorer = Scorer::new().without_noise();
            let first = scorer.score(&product, &ctx, &mut StdRng::seed_from_u64(1)).score;
            let second = scorer.score(&product, &ctx, &mut StdRng::seed_from_u64(2)).score;
            prop_assert_eq!(first, second);
        }

        #[test]
        fn disliked_brand_never_scores_positive(brand in "[a-z]{1,8}") {
            let mut profile = profile();
            profile.brand_scores.insert(brand.clone(), 3.0);
            profile.disliked_brands.insert(brand.clone());
            let session = SessionAdjustments::default();
            let product = Product::new("p", "item", Utc::now()).with_brand(brand);

            prop_assert_eq!(brand_score(&product, &profile, &session), 0.0);
            prop_assert!(negative_penalty(&product, &profile) > 0.0);
        }
    }
}
