pub mod config;
pub mod interact;
pub mod migrate;
pub mod profile;
pub mod recommend;
pub mod seed;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stylematch_core::config::{AppConfig, LoadOptions};
use stylematch_core::recommend::{
    CatalogStore, InteractionStore, RecommendationEngine, SessionEvent,
};
use stylematch_db::{
    connect_with_settings, migrations, DbPool, SqlInteractionRepository, SqlProductRepository,
    SqlProfileRepository,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Classed failure carried through a command's async body.
#[derive(Debug)]
pub(crate) struct Failure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub fn connectivity(error: impl std::fmt::Display) -> Self {
        Self { error_class: "db_connectivity", message: error.to_string(), exit_code: 4 }
    }

    pub fn migration(error: impl std::fmt::Display) -> Self {
        Self { error_class: "migration", message: error.to_string(), exit_code: 5 }
    }

    /// Operation errors keep their full `anyhow` context chain.
    pub fn operation(error_class: &'static str, error: anyhow::Error) -> Self {
        Self { error_class, message: format!("{error:#}"), exit_code: 6 }
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

/// Loads configuration, initializes logging and builds the runtime every
/// database-backed command needs.
pub(crate) fn prepare(
    command: &str,
    options: &LoadOptions,
) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;
    crate::init_logging(&config);

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok((config, runtime))
}

/// Connects and applies pending migrations.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(Failure::connectivity)?;
    migrations::run_pending(&pool).await.map_err(Failure::migration)?;
    Ok(pool)
}

pub(crate) struct Stores {
    pub catalog: Arc<SqlProductRepository>,
    pub interactions: Arc<SqlInteractionRepository>,
    pub profiles: Arc<SqlProfileRepository>,
}

impl Stores {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            catalog: Arc::new(SqlProductRepository::new(pool.clone())),
            interactions: Arc::new(SqlInteractionRepository::new(pool.clone())),
            profiles: Arc::new(SqlProfileRepository::new(pool.clone())),
        }
    }

    pub fn engine(&self, config: &AppConfig) -> RecommendationEngine {
        RecommendationEngine::new(
            self.catalog.clone(),
            self.interactions.clone(),
            config.engine_config(),
        )
        .with_profile_store(self.profiles.clone())
    }
}

/// Sessions live in process memory, so each invocation replays the user's
/// interactions that are still inside the session timeout.
pub(crate) async fn restore_session(
    engine: &RecommendationEngine,
    stores: &Stores,
    user_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    use anyhow::Context;

    let config = engine.config();
    let horizon = now - chrono::Duration::seconds(config.session_timeout_secs.min(86_400) as i64);
    let mut recent = stores
        .interactions
        .recent_for_user(user_id, config.session_rules.max_recent)
        .await
        .context("loading recent interactions")?;
    recent.retain(|interaction| interaction.occurred_at >= horizon);
    recent.reverse();

    let ids: Vec<_> = recent.iter().map(|interaction| interaction.product_id.clone()).collect();
    let products = stores.catalog.find_many(&ids).await.context("loading session products")?;

    for interaction in &recent {
        let product = products.iter().find(|product| product.id == interaction.product_id);
        let event = SessionEvent::from_interaction(interaction, product);
        engine.sessions().record(user_id, event).await;
    }
    Ok(recent.len())
}
