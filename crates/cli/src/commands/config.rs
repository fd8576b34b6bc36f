use std::env;
use std::fs;
use std::path::Path;

use serde_json::{json, Map};
use stylematch_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut fields = Map::new();
    for (key, value, env_keys) in effective_values(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        fields.insert(key.to_string(), json!({ "value": value, "source": source }));
    }

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(serde_json::Value::Object(fields)),
    )
}

type Field = (&'static str, String, &'static [&'static str]);

fn field(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Field {
    (key, value.to_string(), env_keys)
}

fn effective_values(config: &AppConfig) -> Vec<Field> {
    let recommendation = &config.recommendation;
    let diversity = &config.diversity;
    let session = &config.session;

    vec![
        field("database.url", &config.database.url, &["STYLEMATCH_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections,
            &["STYLEMATCH_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["STYLEMATCH_DATABASE_TIMEOUT_SECS"],
        ),
        field(
            "recommendation.default_limit",
            recommendation.default_limit,
            &["STYLEMATCH_RECOMMENDATION_DEFAULT_LIMIT"],
        ),
        field(
            "recommendation.pool_multiplier",
            recommendation.pool_multiplier,
            &["STYLEMATCH_RECOMMENDATION_POOL_MULTIPLIER"],
        ),
        field(
            "recommendation.history_limit",
            recommendation.history_limit,
            &["STYLEMATCH_RECOMMENDATION_HISTORY_LIMIT"],
        ),
        field(
            "recommendation.noise_ratio",
            recommendation.noise_ratio,
            &["STYLEMATCH_RECOMMENDATION_NOISE_RATIO"],
        ),
        field(
            "recommendation.explore_noise_ratio",
            recommendation.explore_noise_ratio,
            &["STYLEMATCH_RECOMMENDATION_EXPLORE_NOISE_RATIO"],
        ),
        field(
            "recommendation.novelty_bonus",
            recommendation.novelty_bonus,
            &["STYLEMATCH_RECOMMENDATION_NOVELTY_BONUS"],
        ),
        field(
            "recommendation.require_image",
            recommendation.require_image,
            &["STYLEMATCH_RECOMMENDATION_REQUIRE_IMAGE"],
        ),
        field(
            "recommendation.normalize_profiles",
            recommendation.normalize_profiles,
            &["STYLEMATCH_RECOMMENDATION_NORMALIZE_PROFILES"],
        ),
        field(
            "recommendation.time_decay_days",
            recommendation.time_decay_days,
            &["STYLEMATCH_RECOMMENDATION_TIME_DECAY_DAYS"],
        ),
        field(
            "recommendation.profile_cache_ttl_secs",
            recommendation.profile_cache_ttl_secs,
            &["STYLEMATCH_RECOMMENDATION_PROFILE_CACHE_TTL_SECS"],
        ),
        field(
            "diversity.window_size",
            diversity.window_size,
            &["STYLEMATCH_DIVERSITY_WINDOW_SIZE"],
        ),
        field(
            "diversity.max_same_category",
            diversity.max_same_category,
            &["STYLEMATCH_DIVERSITY_MAX_SAME_CATEGORY"],
        ),
        field(
            "diversity.max_same_brand",
            diversity.max_same_brand,
            &["STYLEMATCH_DIVERSITY_MAX_SAME_BRAND"],
        ),
        field(
            "diversity.max_same_price_range",
            diversity.max_same_price_range,
            &["STYLEMATCH_DIVERSITY_MAX_SAME_PRICE_RANGE"],
        ),
        field(
            "diversity.max_same_style",
            diversity.max_same_style,
            &["STYLEMATCH_DIVERSITY_MAX_SAME_STYLE"],
        ),
        field(
            "diversity.front_load_slots",
            diversity.front_load_slots,
            &["STYLEMATCH_DIVERSITY_FRONT_LOAD_SLOTS"],
        ),
        field("session.timeout_secs", session.timeout_secs, &["STYLEMATCH_SESSION_TIMEOUT_SECS"]),
        field(
            "session.sweep_interval_secs",
            session.sweep_interval_secs,
            &["STYLEMATCH_SESSION_SWEEP_INTERVAL_SECS"],
        ),
        field("session.max_recent", session.max_recent, &["STYLEMATCH_SESSION_MAX_RECENT"]),
        field(
            "session.analysis_window",
            session.analysis_window,
            &["STYLEMATCH_SESSION_ANALYSIS_WINDOW"],
        ),
        field(
            "logging.level",
            &config.logging.level,
            &["STYLEMATCH_LOGGING_LEVEL", "STYLEMATCH_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["STYLEMATCH_LOGGING_FORMAT", "STYLEMATCH_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
