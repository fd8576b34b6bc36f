pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod recommend;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::context::ContextInfo;
pub use domain::interaction::{Interaction, Outcome};
pub use domain::product::{Product, ProductId};
pub use domain::style::StyleBucket;
pub use errors::{ApplicationError, DomainError};
pub use recommend::{
    PreferenceProfile, Recommendation, RecommendationEngine, RecommendationRequest,
    SessionAdjustments, StoreError,
};
