use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::domain::context::ContextInfo;
use crate::domain::interaction::Interaction;
use crate::domain::product::{Product, ProductId};
use crate::errors::DomainError;

use super::diversity::{diversity_score, DiversityCaps, DiversitySelector};
use super::explore::ExplorePolicy;
use super::profile::{MaturityBucket, PreferenceProfile, ProfileBuilder, ProfileOptions};
use super::scoring::{popularity_score, Scorer, ScoringContext};
use super::session::{
    InMemorySessionStore, SessionAdjustments, SessionEvent, SessionRules, SessionStore,
    SessionTracker,
};
use super::store::{CandidateFilter, CatalogStore, InteractionStore, ProfileStore, StoreError};
use super::{
    RecommendResult, DEFAULT_EXPLORE_NOISE_RATIO, DEFAULT_HISTORY_LIMIT, DEFAULT_LIMIT,
    DEFAULT_NOISE_RATIO, DEFAULT_NOVELTY_BONUS, DEFAULT_POOL_MULTIPLIER, EXPLORATION_TAGS,
    MAX_PROFILE_CACHE_TTL_SECS, SESSION_TIMEOUT_SECS, SWEEP_INTERVAL_SECS,
};

/// Price-sensitive profiles fetch only within the liked range widened by this share.
const PRICE_BOUND_WIDENING: f64 = 0.3;
const PRICE_SENSITIVE_ABOVE: f64 = 0.7;

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub default_limit: usize,
    pub pool_multiplier: usize,
    pub history_limit: usize,
    pub noise_ratio: f64,
    pub explore_noise_ratio: f64,
    pub novelty_bonus: f64,
    pub require_image: bool,
    pub profile: ProfileOptions,
    /// Zero disables the in-process profile cache.
    pub profile_cache_ttl_secs: u64,
    pub diversity: DiversityCaps,
    pub session_rules: SessionRules,
    pub session_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub explore: ExplorePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            pool_multiplier: DEFAULT_POOL_MULTIPLIER,
            history_limit: DEFAULT_HISTORY_LIMIT,
            noise_ratio: DEFAULT_NOISE_RATIO,
            explore_noise_ratio: DEFAULT_EXPLORE_NOISE_RATIO,
            novelty_bonus: DEFAULT_NOVELTY_BONUS,
            require_image: true,
            profile: ProfileOptions::default(),
            profile_cache_ttl_secs: MAX_PROFILE_CACHE_TTL_SECS,
            diversity: DiversityCaps::default(),
            session_rules: SessionRules::default(),
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            explore: ExplorePolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecommendationRequest {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    pub correlation_id: Option<String>,
    /// Evaluation instant for the calendar context; the engine clock when absent.
    pub at: Option<DateTime<Utc>>,
}

impl RecommendationRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), ..Self::default() }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Personalized,
    Popular,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personalized => "personalized",
            Self::Popular => "popular",
        }
    }
}

/// Ordered products plus the advisory session flags. Scores are not exposed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub request_id: String,
    pub user_id: Option<String>,
    pub strategy: Strategy,
    pub products: Vec<Product>,
    pub explored: bool,
    pub maturity: Option<MaturityBucket>,
    pub suggest_break: bool,
    pub should_shift_category: bool,
    pub fast_swiping: bool,
    pub diversity_score: f64,
}

struct CachedProfile {
    profile: Arc<PreferenceProfile>,
    cached_at: DateTime<Utc>,
}

pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionStore>,
    profiles: Option<Arc<dyn ProfileStore>>,
    session_store: Arc<dyn SessionStore>,
    sessions: Arc<SessionTracker>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    scorer: Scorer,
    builder: ProfileBuilder,
    cache: RwLock<HashMap<String, CachedProfile>>,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionStore>,
        config: EngineConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let sessions = build_tracker(&session_store, &clock, &config);
        let scorer = Scorer::new()
            .with_noise(config.noise_ratio, config.explore_noise_ratio)
            .with_novelty_bonus(config.novelty_bonus);
        let builder = ProfileBuilder::with_options(config.profile.clone());

        Self {
            catalog,
            interactions,
            profiles: None,
            session_store,
            sessions,
            clock,
            config,
            scorer,
            builder,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_profile_store(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = store;
        self.sessions = build_tracker(&self.session_store, &self.clock, &self.config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.sessions = build_tracker(&self.session_store, &self.clock, &self.config);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    /// Starts the periodic session sweep on the current runtime.
    pub fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let every = std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1));
        Arc::clone(&self.sessions).spawn_sweeper(every)
    }

    /// Runs the full pipeline. Store failures degrade to popularity ranking
    /// and finally to an empty list; they never reach the caller.
    pub async fn recommend<R>(&self, request: RecommendationRequest, rng: &mut R) -> Recommendation
    where
        R: Rng + Send + ?Sized,
    {
        let correlation_id =
            request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let limit = request.limit.unwrap_or(self.config.default_limit);
        let now = request.at.unwrap_or_else(|| self.clock.now());

        let Some(user_id) = request.user_id.as_deref() else {
            return self.popular(&correlation_id, None, limit, SessionAdjustments::default()).await;
        };

        let adjustments = self.sessions.adjustments(user_id).await;
        let profile = match self.profile_for(user_id).await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(
                    event_name = "recommend.fallback.popular",
                    correlation_id = %correlation_id,
                    user_id,
                    error = %error,
                    "profile unavailable, ranking by popularity"
                );
                return self.popular(&correlation_id, Some(user_id), limit, adjustments).await;
            }
        };

        let exploring = self.config.explore.draw(rng, profile.interaction_count);
        let (filter, caps) = self.personalized_filter(user_id, &profile, &adjustments, limit).await;

        let candidates = match self.fetch_candidates(filter, exploring).await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "recommend.fallback.popular",
                    correlation_id = %correlation_id,
                    user_id,
                    error = %error,
                    "candidate fetch failed, ranking by popularity"
                );
                return self.popular(&correlation_id, Some(user_id), limit, adjustments).await;
            }
        };

        let context = ContextInfo::from_datetime(&now);
        let ctx = ScoringContext::new(&profile, &adjustments, context).exploring(exploring);
        let scored = self.scorer.score_all(&candidates, &ctx, rng);
        let ranked = scored.into_iter().map(|candidate| candidate.product).collect();
        let selection = DiversitySelector::new(caps).select_detailed(ranked, limit);

        info!(
            event_name = "recommend.completed",
            correlation_id = %correlation_id,
            user_id,
            strategy = Strategy::Personalized.as_str(),
            candidates = candidates.len(),
            returned = selection.products.len(),
            backfilled = selection.backfilled(),
            explored = exploring,
            "recommendation ready"
        );

        finish(
            correlation_id,
            Some(user_id),
            Strategy::Personalized,
            selection.products,
            exploring,
            Some(profile.maturity()),
            &adjustments,
        )
    }

    /// Cached profile when fresh, otherwise rebuilt from history. A persisted
    /// profile is the fallback when history cannot be read.
    pub async fn profile_for(&self, user_id: &str) -> RecommendResult<Arc<PreferenceProfile>> {
        let now = self.clock.now();
        if let Some(profile) = self.cached_profile(user_id, now).await {
            return Ok(profile);
        }

        let profile = match self.build_profile(user_id, now).await {
            Ok(profile) => Arc::new(profile),
            Err(error) => return self.stored_profile(user_id, error).await,
        };

        if let Some(store) = &self.profiles {
            if let Err(error) = store.save(user_id, &profile).await {
                warn!(
                    event_name = "profile.persist_failed",
                    user_id,
                    error = %error,
                    "profile could not be persisted"
                );
            }
        }

        if self.config.profile_cache_ttl_secs > 0 {
            let mut cache = self.cache.write().await;
            cache.insert(
                user_id.to_string(),
                CachedProfile { profile: Arc::clone(&profile), cached_at: now },
            );
        }
        Ok(profile)
    }

    pub async fn invalidate_profile(&self, user_id: &str) {
        self.cache.write().await.remove(user_id);
    }

    /// Updates the session first, then appends to the log. The session keeps
    /// the event even when the append fails.
    pub async fn record_interaction(
        &self,
        interaction: Interaction,
    ) -> RecommendResult<SessionAdjustments> {
        if interaction.user_id.trim().is_empty() || interaction.product_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "interaction requires a user id and a product id".to_string(),
            )
            .into());
        }

        let lookup = self.catalog.find_many(std::slice::from_ref(&interaction.product_id)).await;
        let product = match lookup {
            Ok(mut found) => found.pop(),
            Err(error) => {
                warn!(
                    user_id = %interaction.user_id,
                    product_id = %interaction.product_id,
                    error = %error,
                    "product lookup failed, session event carries no attributes"
                );
                None
            }
        };

        let event = SessionEvent::from_interaction(&interaction, product.as_ref());
        let adjustments = self.sessions.record(&interaction.user_id, event).await;
        let appended = self.interactions.append(&interaction).await;
        self.invalidate_profile(&interaction.user_id).await;
        appended?;
        Ok(adjustments)
    }

    async fn cached_profile(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Arc<PreferenceProfile>> {
        let ttl = self.config.profile_cache_ttl_secs.min(MAX_PROFILE_CACHE_TTL_SECS);
        if ttl == 0 {
            return None;
        }
        let cache = self.cache.read().await;
        let entry = cache.get(user_id)?;
        (now - entry.cached_at < seconds(ttl)).then(|| Arc::clone(&entry.profile))
    }

    async fn build_profile(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PreferenceProfile, StoreError> {
        let (history, total) = tokio::try_join!(
            self.interactions.recent_for_user(user_id, self.config.history_limit),
            self.interactions.count_for_user(user_id),
        )?;

        let ids: Vec<ProductId> = history
            .iter()
            .map(|interaction| interaction.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products: HashMap<ProductId, Product> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.catalog
                .find_many(&ids)
                .await?
                .into_iter()
                .map(|product| (product.id.clone(), product))
                .collect()
        };

        let total = usize::try_from(total).unwrap_or(usize::MAX);
        Ok(self.builder.build_with_total(&history, &products, total, now))
    }

    async fn stored_profile(
        &self,
        user_id: &str,
        error: StoreError,
    ) -> RecommendResult<Arc<PreferenceProfile>> {
        let Some(store) = &self.profiles else {
            return Err(error.into());
        };
        match store.load(user_id).await {
            Ok(Some(profile)) => {
                warn!(user_id, error = %error, "history unavailable, using persisted profile");
                Ok(Arc::new(profile))
            }
            Ok(None) => Err(error.into()),
            Err(load_error) => {
                warn!(user_id, error = %load_error, "persisted profile unavailable");
                Err(error.into())
            }
        }
    }

    async fn personalized_filter(
        &self,
        user_id: &str,
        profile: &PreferenceProfile,
        adjustments: &SessionAdjustments,
        limit: usize,
    ) -> (CandidateFilter, DiversityCaps) {
        let mut caps = self.config.diversity;
        let blocked_brands =
            profile.disliked_brands.iter().chain(adjustments.avoid_brands.iter()).cloned();
        let mut filter = self.base_filter(limit).excluding_brands(blocked_brands);

        if adjustments.should_shift_category && !adjustments.avoid_categories.is_empty() {
            filter = filter.excluding_categories(adjustments.avoid_categories.iter().cloned());
            caps = caps.with_max_same_category(1);
        }

        if profile.price_sensitivity > PRICE_SENSITIVE_ABOVE {
            let range = profile.price_range;
            filter = filter.with_price_bounds(
                Some(range.min * (1.0 - PRICE_BOUND_WIDENING)),
                Some(range.max * (1.0 + PRICE_BOUND_WIDENING)),
            );
        }

        match self.interactions.answered_product_ids(user_id).await {
            Ok(answered) => filter = filter.excluding_ids(answered),
            Err(error) => {
                warn!(user_id, error = %error, "answered products unavailable, not excluding");
            }
        }

        (filter, caps)
    }

    /// Exploration draws first ask for exploration-tagged items and fall back
    /// to the plain filter when none exist.
    async fn fetch_candidates(
        &self,
        filter: CandidateFilter,
        exploring: bool,
    ) -> Result<Vec<Product>, StoreError> {
        if exploring {
            let exploratory = filter.clone().requiring_any_tag(EXPLORATION_TAGS.iter().copied());
            let found = self.catalog.fetch_candidates(&exploratory).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        self.catalog.fetch_candidates(&filter.without_tag_requirement()).await
    }

    async fn popular(
        &self,
        correlation_id: &str,
        user_id: Option<&str>,
        limit: usize,
        adjustments: SessionAdjustments,
    ) -> Recommendation {
        let products = match self.catalog.fetch_candidates(&self.base_filter(limit)).await {
            Ok(candidates) => {
                let ranked = rank_by_popularity(candidates);
                DiversitySelector::new(self.config.diversity).select_products(ranked, limit)
            }
            Err(error) => {
                warn!(
                    event_name = "recommend.fallback.empty",
                    correlation_id,
                    error = %error,
                    "catalog unavailable, returning no products"
                );
                Vec::new()
            }
        };

        info!(
            event_name = "recommend.completed",
            correlation_id,
            user_id = user_id.unwrap_or("anonymous"),
            strategy = Strategy::Popular.as_str(),
            returned = products.len(),
            "recommendation ready"
        );

        finish(
            correlation_id.to_string(),
            user_id,
            Strategy::Popular,
            products,
            false,
            None,
            &adjustments,
        )
    }

    fn base_filter(&self, limit: usize) -> CandidateFilter {
        CandidateFilter::active(limit.saturating_mul(self.config.pool_multiplier.max(1)))
            .with_image_required(self.config.require_image)
    }
}

fn build_tracker(
    store: &Arc<dyn SessionStore>,
    clock: &Arc<dyn Clock>,
    config: &EngineConfig,
) -> Arc<SessionTracker> {
    Arc::new(SessionTracker::new(
        Arc::clone(store),
        Arc::clone(clock),
        config.session_rules.clone(),
        seconds(config.session_timeout_secs),
    ))
}

fn seconds(secs: u64) -> Duration {
    // chrono durations are bounded by i64 milliseconds
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}

/// Most popular first; equal popularity prefers the newer product.
fn rank_by_popularity(mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by(|a, b| {
        popularity_score(b)
            .partial_cmp(&popularity_score(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    products
}

fn finish(
    request_id: String,
    user_id: Option<&str>,
    strategy: Strategy,
    products: Vec<Product>,
    explored: bool,
    maturity: Option<MaturityBucket>,
    adjustments: &SessionAdjustments,
) -> Recommendation {
    Recommendation {
        request_id,
        user_id: user_id.map(str::to_string),
        strategy,
        diversity_score: diversity_score(&products),
        products,
        explored,
        maturity,
        suggest_break: adjustments.suggest_break,
        should_shift_category: adjustments.should_shift_category,
        fast_swiping: adjustments.fast_swiping,
    }
}
