//! Short-lived per-user session tracking.
//!
//! Sessions live in a [`SessionStore`] and only nudge scoring; losing one is
//! never an error.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::domain::interaction::{Interaction, Outcome};
use crate::domain::product::{Product, ProductId};

use super::{BREAK_AFTER_NEGATIVES, SHIFT_AFTER_NEGATIVES};

/// One interaction as the session sees it, with the product attributes copied
/// in at record time.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub product_id: ProductId,
    pub outcome: Outcome,
    pub tags: BTreeSet<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub at: DateTime<Utc>,
    pub response_time_ms: Option<u32>,
}

impl SessionEvent {
    pub fn from_interaction(interaction: &Interaction, product: Option<&Product>) -> Self {
        Self {
            product_id: interaction.product_id.clone(),
            outcome: interaction.outcome,
            tags: product.map(|product| product.tags.clone()).unwrap_or_default(),
            category: product.and_then(Product::category_key),
            brand: product.and_then(Product::brand_key),
            at: interaction.occurred_at,
            response_time_ms: interaction.response_time_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionRules {
    pub max_recent: usize,
    pub analysis_window: usize,
    pub avoid_min_count: usize,
    pub dominance_ratio: f64,
    pub shift_after: u32,
    pub break_after: u32,
    pub fast_swipe_min_events: usize,
    pub fast_swipe_threshold_ms: f64,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            max_recent: 20,
            analysis_window: 10,
            avoid_min_count: 3,
            dominance_ratio: 2.0,
            shift_after: SHIFT_AFTER_NEGATIVES,
            break_after: BREAK_AFTER_NEGATIVES,
            fast_swipe_min_events: 5,
            fast_swipe_threshold_ms: 1_000.0,
        }
    }
}

/// Advisory perturbations derived from the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionAdjustments {
    pub avoid_tags: BTreeSet<String>,
    pub avoid_categories: BTreeSet<String>,
    pub avoid_brands: BTreeSet<String>,
    pub boost_tags: BTreeSet<String>,
    pub boost_categories: BTreeSet<String>,
    pub boost_brands: BTreeSet<String>,
    pub should_shift_category: bool,
    pub suggest_break: bool,
    pub fast_swiping: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub recent: VecDeque<SessionEvent>,
    pub consecutive_negatives: u32,
    pub total_events: u64,
}

#[derive(Default)]
struct Tally {
    positive: usize,
    negative: usize,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            started_at: now,
            last_activity: now,
            recent: VecDeque::new(),
            consecutive_negatives: 0,
            total_events: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity >= timeout
    }

    /// Views are recorded but leave the negative streak untouched.
    pub fn record(&mut self, event: SessionEvent, rules: &SessionRules) {
        if event.outcome.is_negative() {
            self.consecutive_negatives = self.consecutive_negatives.saturating_add(1);
        } else if event.outcome.is_positive() {
            self.consecutive_negatives = 0;
        }

        self.last_activity = self.last_activity.max(event.at);
        self.total_events += 1;
        self.recent.push_back(event);
        while self.recent.len() > rules.max_recent.max(1) {
            self.recent.pop_front();
        }
    }

    pub fn adjustments(&self, rules: &SessionRules) -> SessionAdjustments {
        let window = self.recent.iter().rev().take(rules.analysis_window.max(1));

        let mut tags: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut categories: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut brands: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut response_times = Vec::new();

        for event in window {
            if let Some(millis) = event.response_time_ms {
                response_times.push(f64::from(millis));
            }
            let bump = |tally: &mut Tally| {
                if event.outcome.is_negative() {
                    tally.negative += 1;
                } else if event.outcome.is_positive() {
                    tally.positive += 1;
                }
            };
            for tag in &event.tags {
                bump(tags.entry(tag.as_str()).or_default());
            }
            if let Some(category) = &event.category {
                bump(categories.entry(category.as_str()).or_default());
            }
            if let Some(brand) = &event.brand {
                bump(brands.entry(brand.as_str()).or_default());
            }
        }

        let (avoid_tags, boost_tags) = classify(&tags, rules);
        let (avoid_categories, boost_categories) = classify(&categories, rules);
        let (avoid_brands, boost_brands) = classify(&brands, rules);

        let fast_swiping = response_times.len() >= rules.fast_swipe_min_events
            && response_times.iter().sum::<f64>() / (response_times.len() as f64)
                < rules.fast_swipe_threshold_ms;

        SessionAdjustments {
            avoid_tags,
            avoid_categories,
            avoid_brands,
            boost_tags,
            boost_categories,
            boost_brands,
            should_shift_category: self.consecutive_negatives >= rules.shift_after,
            suggest_break: self.consecutive_negatives >= rules.break_after,
            fast_swiping,
        }
    }
}

fn classify(
    tallies: &BTreeMap<&str, Tally>,
    rules: &SessionRules,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut avoid = BTreeSet::new();
    let mut boost = BTreeSet::new();
    for (key, tally) in tallies {
        if tally.negative >= rules.avoid_min_count
            && tally.negative as f64 > rules.dominance_ratio * tally.positive as f64
        {
            avoid.insert((*key).to_string());
        } else if tally.positive >= rules.avoid_min_count
            && tally.positive as f64 > rules.dominance_ratio * tally.negative as f64
        {
            boost.insert((*key).to_string());
        }
    }
    (avoid, boost)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<SessionState>;
    /// Applies `event` to the user's live session, starting a fresh one when
    /// none exists or the current one expired. Read and write happen as one
    /// step per user.
    async fn record(
        &self,
        user_id: &str,
        event: SessionEvent,
        rules: &SessionRules,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> SessionAdjustments;
    async fn remove(&self, user_id: &str) -> Option<SessionState>;
    /// Drops sessions idle for at least `timeout`; returns how many went.
    async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> usize;
    async fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).cloned()
    }

    async fn record(
        &self,
        user_id: &str,
        event: SessionEvent,
        rules: &SessionRules,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> SessionAdjustments {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| SessionState::new(user_id, now));
        if session.is_expired(now, timeout) {
            *session = SessionState::new(user_id, now);
        }
        session.record(event, rules);
        session.last_activity = session.last_activity.max(now);
        session.adjustments(rules)
    }

    async fn remove(&self, user_id: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id)
    }

    async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, timeout));
        before - sessions.len()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Records outcomes into sessions and answers adjustment queries.
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    rules: SessionRules,
    timeout: Duration,
}

impl SessionTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        rules: SessionRules,
        timeout: Duration,
    ) -> Self {
        Self { store, clock, rules, timeout }
    }

    pub fn rules(&self) -> &SessionRules {
        &self.rules
    }

    pub async fn record(&self, user_id: &str, event: SessionEvent) -> SessionAdjustments {
        let now = self.clock.now();
        self.store.record(user_id, event, &self.rules, now, self.timeout).await
    }

    pub async fn adjustments(&self, user_id: &str) -> SessionAdjustments {
        let now = self.clock.now();
        match self.store.get(user_id).await {
            Some(session) if !session.is_expired(now, self.timeout) => {
                session.adjustments(&self.rules)
            }
            Some(_) => {
                self.store.remove(user_id).await;
                SessionAdjustments::default()
            }
            None => SessionAdjustments::default(),
        }
    }

    pub async fn end(&self, user_id: &str) -> bool {
        self.store.remove(user_id).await.is_some()
    }

    pub async fn sweep(&self) -> usize {
        let removed = self.store.sweep(self.clock.now(), self.timeout).await;
        if removed > 0 {
            tracing::debug!(
                event_name = "session.sweep",
                correlation_id = "session-sweeper",
                removed,
                "expired sessions purged"
            );
        }
        removed
    }

    /// Runs [`sweep`](Self::sweep) on a fixed interval until the handle is
    /// aborted or the runtime shuts down.
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
