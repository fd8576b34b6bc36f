//! Personalized recommendation pipeline.
//!
//! Candidates come from a [`CatalogStore`], are scored against a
//! [`PreferenceProfile`] and the live session, then pass through the
//! [`DiversitySelector`]. The [`RecommendationEngine`] wires the stages
//! together and degrades to popularity ranking when a store fails.

pub mod diversity;
pub mod engine;
pub mod explore;
pub mod profile;
pub mod scoring;
pub mod seasonal;
pub mod session;
pub mod store;

use crate::errors::ApplicationError;

use self::profile::PriceRange;
use self::scoring::ScoringWeights;

pub use diversity::{diversity_score, DiversityCaps, DiversitySelector, Selection};
pub use engine::{
    EngineConfig, Recommendation, RecommendationEngine, RecommendationRequest, Strategy,
};
pub use explore::ExplorePolicy;
pub use profile::{MaturityBucket, PreferenceProfile, ProfileBuilder, ProfileOptions};
pub use scoring::{ComponentScores, ScoredCandidate, Scorer, ScoringContext, WeightTable};
pub use seasonal::{seasonal_score, ContextBoosts};
pub use session::{
    InMemorySessionStore, SessionAdjustments, SessionEvent, SessionRules, SessionState,
    SessionStore, SessionTracker,
};
pub use store::{CandidateFilter, CatalogStore, InteractionStore, ProfileStore, StoreError};

pub type RecommendResult<T> = Result<T, ApplicationError>;

pub const DEFAULT_LIMIT: usize = 20;
/// Candidate pool size as a multiple of the requested limit.
pub const DEFAULT_POOL_MULTIPLIER: usize = 10;
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

pub const DEFAULT_PRICE_RANGE: PriceRange =
    PriceRange { min: 0.0, max: 50_000.0, preferred: 10_000.0 };
pub const STRONG_TAG_THRESHOLD: f64 = 3.0;
pub const STRONG_TAG_BONUS: f64 = 0.5;
pub const MAX_PROFILE_CACHE_TTL_SECS: u64 = 300;

pub const AVOID_MULTIPLIER: f64 = 0.3;
pub const BOOST_MULTIPLIER: f64 = 1.5;
pub const NEGATIVE_PENALTY_CAP: f64 = 0.8;
pub const DEFAULT_NOISE_RATIO: f64 = 0.3;
pub const DEFAULT_EXPLORE_NOISE_RATIO: f64 = 0.5;
pub const DEFAULT_NOVELTY_BONUS: f64 = 0.3;

pub const DEFAULT_WINDOW_SIZE: usize = 5;
pub const MAX_SAME_CATEGORY: usize = 2;
pub const MAX_SAME_BRAND: usize = 2;
pub const MAX_SAME_PRICE_RANGE: usize = 3;
pub const MAX_SAME_STYLE: usize = 2;

pub const SHIFT_AFTER_NEGATIVES: u32 = 3;
pub const BREAK_AFTER_NEGATIVES: u32 = 5;
pub const SESSION_TIMEOUT_SECS: u64 = 30 * 60;
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Candidates must carry one of these to qualify for an exploration draw.
pub const EXPLORATION_TAGS: &[&str] =
    &["trend", "experimental", "avant-garde", "unique", "new-arrival"];

/// Fewer than 10 interactions: lean on popularity and season.
pub const COLD_WEIGHTS: ScoringWeights = ScoringWeights {
    tag: 0.8,
    category: 1.0,
    brand: 0.5,
    price: 1.0,
    seasonal: 2.0,
    popularity: 2.5,
    style: 0.3,
    negative: 0.5,
};

pub const WARMING_WEIGHTS: ScoringWeights = ScoringWeights {
    tag: 1.5,
    category: 1.2,
    brand: 0.8,
    price: 1.2,
    seasonal: 1.8,
    popularity: 1.5,
    style: 0.6,
    negative: 0.8,
};

/// 50 or more interactions: learned affinities dominate.
pub const MATURE_WEIGHTS: ScoringWeights = ScoringWeights {
    tag: 2.5,
    category: 1.5,
    brand: 1.2,
    price: 1.5,
    seasonal: 1.5,
    popularity: 1.0,
    style: 0.8,
    negative: 1.0,
};
