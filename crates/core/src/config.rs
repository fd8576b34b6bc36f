use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recommend::{
    DiversityCaps, EngineConfig, ExplorePolicy, ProfileOptions, SessionRules,
    MAX_PROFILE_CACHE_TTL_SECS,
};

pub const DEFAULT_CONFIG_FILE: &str = "stylematch.toml";
pub const NESTED_CONFIG_FILE: &str = "config/stylematch.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub recommendation: RecommendationConfig,
    pub diversity: DiversityConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub default_limit: usize,
    pub pool_multiplier: usize,
    pub history_limit: usize,
    pub noise_ratio: f64,
    pub explore_noise_ratio: f64,
    pub novelty_bonus: f64,
    pub require_image: bool,
    pub normalize_profiles: bool,
    /// Zero disables time decay.
    pub time_decay_days: f64,
    pub profile_cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DiversityConfig {
    pub window_size: usize,
    pub max_same_category: usize,
    pub max_same_brand: usize,
    pub max_same_price_range: usize,
    pub max_same_style: usize,
    pub front_load_slots: usize,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_recent: usize,
    pub analysis_window: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub default_limit: Option<usize>,
    pub noise_ratio: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let rules = SessionRules::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://stylematch.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            recommendation: RecommendationConfig {
                default_limit: engine.default_limit,
                pool_multiplier: engine.pool_multiplier,
                history_limit: engine.history_limit,
                noise_ratio: engine.noise_ratio,
                explore_noise_ratio: engine.explore_noise_ratio,
                novelty_bonus: engine.novelty_bonus,
                require_image: engine.require_image,
                normalize_profiles: false,
                time_decay_days: 0.0,
                profile_cache_ttl_secs: engine.profile_cache_ttl_secs,
            },
            diversity: DiversityConfig {
                window_size: engine.diversity.window_size,
                max_same_category: engine.diversity.max_same_category,
                max_same_brand: engine.diversity.max_same_brand,
                max_same_price_range: engine.diversity.max_same_price_range,
                max_same_style: engine.diversity.max_same_style,
                front_load_slots: engine.diversity.front_load_slots,
            },
            session: SessionConfig {
                timeout_secs: engine.session_timeout_secs,
                sweep_interval_secs: engine.sweep_interval_secs,
                max_recent: rules.max_recent,
                analysis_window: rules.analysis_window,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Runtime settings for the recommendation engine.
    pub fn engine_config(&self) -> EngineConfig {
        let recommendation = &self.recommendation;
        let time_decay_days =
            (recommendation.time_decay_days > 0.0).then_some(recommendation.time_decay_days);

        EngineConfig {
            default_limit: recommendation.default_limit,
            pool_multiplier: recommendation.pool_multiplier,
            history_limit: recommendation.history_limit,
            noise_ratio: recommendation.noise_ratio,
            explore_noise_ratio: recommendation.explore_noise_ratio,
            novelty_bonus: recommendation.novelty_bonus,
            require_image: recommendation.require_image,
            profile: ProfileOptions {
                normalize: recommendation.normalize_profiles,
                time_decay_days,
                ..ProfileOptions::default()
            },
            profile_cache_ttl_secs: recommendation.profile_cache_ttl_secs,
            diversity: DiversityCaps {
                window_size: self.diversity.window_size,
                max_same_category: self.diversity.max_same_category,
                max_same_brand: self.diversity.max_same_brand,
                max_same_price_range: self.diversity.max_same_price_range,
                max_same_style: self.diversity.max_same_style,
                front_load_slots: self.diversity.front_load_slots,
            },
            session_rules: SessionRules {
                max_recent: self.session.max_recent,
                analysis_window: self.session.analysis_window,
                ..SessionRules::default()
            },
            session_timeout_secs: self.session.timeout_secs,
            sweep_interval_secs: self.session.sweep_interval_secs,
            explore: ExplorePolicy::default(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(recommendation) = patch.recommendation {
            let target = &mut self.recommendation;
            if let Some(default_limit) = recommendation.default_limit {
                target.default_limit = default_limit;
            }
            if let Some(pool_multiplier) = recommendation.pool_multiplier {
                target.pool_multiplier = pool_multiplier;
            }
            if let Some(history_limit) = recommendation.history_limit {
                target.history_limit = history_limit;
            }
            if let Some(noise_ratio) = recommendation.noise_ratio {
                target.noise_ratio = noise_ratio;
            }
            if let Some(explore_noise_ratio) = recommendation.explore_noise_ratio {
                target.explore_noise_ratio = explore_noise_ratio;
            }
            if let Some(novelty_bonus) = recommendation.novelty_bonus {
                target.novelty_bonus = novelty_bonus;
            }
            if let Some(require_image) = recommendation.require_image {
                target.require_image = require_image;
            }
            if let Some(normalize_profiles) = recommendation.normalize_profiles {
                target.normalize_profiles = normalize_profiles;
            }
            if let Some(time_decay_days) = recommendation.time_decay_days {
                target.time_decay_days = time_decay_days;
            }
            if let Some(ttl) = recommendation.profile_cache_ttl_secs {
                target.profile_cache_ttl_secs = ttl;
            }
        }

        if let Some(diversity) = patch.diversity {
            let target = &mut self.diversity;
            if let Some(window_size) = diversity.window_size {
                target.window_size = window_size;
            }
            if let Some(cap) = diversity.max_same_category {
                target.max_same_category = cap;
            }
            if let Some(cap) = diversity.max_same_brand {
                target.max_same_brand = cap;
            }
            if let Some(cap) = diversity.max_same_price_range {
                target.max_same_price_range = cap;
            }
            if let Some(cap) = diversity.max_same_style {
                target.max_same_style = cap;
            }
            if let Some(slots) = diversity.front_load_slots {
                target.front_load_slots = slots;
            }
        }

        if let Some(session) = patch.session {
            if let Some(timeout_secs) = session.timeout_secs {
                self.session.timeout_secs = timeout_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(max_recent) = session.max_recent {
                self.session.max_recent = max_recent;
            }
            if let Some(analysis_window) = session.analysis_window {
                self.session.analysis_window = analysis_window;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STYLEMATCH_DATABASE_URL") {
            self.database.url = value;
        }
        let database = &mut self.database;
        override_from_env(&mut database.max_connections, "STYLEMATCH_DATABASE_MAX_CONNECTIONS")?;
        override_from_env(&mut database.timeout_secs, "STYLEMATCH_DATABASE_TIMEOUT_SECS")?;

        let recommendation = &mut self.recommendation;
        for (target, key) in [
            (&mut recommendation.default_limit, "STYLEMATCH_RECOMMENDATION_DEFAULT_LIMIT"),
            (&mut recommendation.pool_multiplier, "STYLEMATCH_RECOMMENDATION_POOL_MULTIPLIER"),
            (&mut recommendation.history_limit, "STYLEMATCH_RECOMMENDATION_HISTORY_LIMIT"),
        ] {
            override_from_env(target, key)?;
        }
        for (target, key) in [
            (&mut recommendation.noise_ratio, "STYLEMATCH_RECOMMENDATION_NOISE_RATIO"),
            (
                &mut recommendation.explore_noise_ratio,
                "STYLEMATCH_RECOMMENDATION_EXPLORE_NOISE_RATIO",
            ),
            (&mut recommendation.novelty_bonus, "STYLEMATCH_RECOMMENDATION_NOVELTY_BONUS"),
            (&mut recommendation.time_decay_days, "STYLEMATCH_RECOMMENDATION_TIME_DECAY_DAYS"),
        ] {
            override_from_env(target, key)?;
        }
        override_from_env(
            &mut recommendation.require_image,
            "STYLEMATCH_RECOMMENDATION_REQUIRE_IMAGE",
        )?;
        override_from_env(
            &mut recommendation.normalize_profiles,
            "STYLEMATCH_RECOMMENDATION_NORMALIZE_PROFILES",
        )?;
        override_from_env(
            &mut recommendation.profile_cache_ttl_secs,
            "STYLEMATCH_RECOMMENDATION_PROFILE_CACHE_TTL_SECS",
        )?;

        let diversity = &mut self.diversity;
        for (target, key) in [
            (&mut diversity.window_size, "STYLEMATCH_DIVERSITY_WINDOW_SIZE"),
            (&mut diversity.max_same_category, "STYLEMATCH_DIVERSITY_MAX_SAME_CATEGORY"),
            (&mut diversity.max_same_brand, "STYLEMATCH_DIVERSITY_MAX_SAME_BRAND"),
            (&mut diversity.max_same_price_range, "STYLEMATCH_DIVERSITY_MAX_SAME_PRICE_RANGE"),
            (&mut diversity.max_same_style, "STYLEMATCH_DIVERSITY_MAX_SAME_STYLE"),
            (&mut diversity.front_load_slots, "STYLEMATCH_DIVERSITY_FRONT_LOAD_SLOTS"),
        ] {
            override_from_env(target, key)?;
        }

        let session = &mut self.session;
        override_from_env(&mut session.timeout_secs, "STYLEMATCH_SESSION_TIMEOUT_SECS")?;
        override_from_env(
            &mut session.sweep_interval_secs,
            "STYLEMATCH_SESSION_SWEEP_INTERVAL_SECS",
        )?;
        override_from_env(&mut session.max_recent, "STYLEMATCH_SESSION_MAX_RECENT")?;
        override_from_env(&mut session.analysis_window, "STYLEMATCH_SESSION_ANALYSIS_WINDOW")?;

        // Short aliases are accepted for the two logging keys.
        let log_level =
            read_env("STYLEMATCH_LOGGING_LEVEL").or_else(|| read_env("STYLEMATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STYLEMATCH_LOGGING_FORMAT").or_else(|| read_env("STYLEMATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(default_limit) = overrides.default_limit {
            self.recommendation.default_limit = default_limit;
        }
        if let Some(noise_ratio) = overrides.noise_ratio {
            self.recommendation.noise_ratio = noise_ratio;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_recommendation(&self.recommendation)?;
        validate_diversity(&self.diversity)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `load` would read for these options, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_recommendation(recommendation: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendation.default_limit == 0 || recommendation.default_limit > 200 {
        return Err(ConfigError::Validation(
            "recommendation.default_limit must be in range 1..=200".to_string(),
        ));
    }
    if recommendation.pool_multiplier == 0 {
        return Err(ConfigError::Validation(
            "recommendation.pool_multiplier must be greater than zero".to_string(),
        ));
    }
    if recommendation.history_limit == 0 {
        return Err(ConfigError::Validation(
            "recommendation.history_limit must be greater than zero".to_string(),
        ));
    }

    validate_ratio("recommendation.noise_ratio", recommendation.noise_ratio)?;
    validate_ratio("recommendation.explore_noise_ratio", recommendation.explore_noise_ratio)?;

    if !recommendation.novelty_bonus.is_finite() || recommendation.novelty_bonus < 0.0 {
        return Err(ConfigError::Validation(
            "recommendation.novelty_bonus must be a finite, non-negative number".to_string(),
        ));
    }
    if !recommendation.time_decay_days.is_finite() || recommendation.time_decay_days < 0.0 {
        return Err(ConfigError::Validation(
            "recommendation.time_decay_days must be zero (disabled) or a positive number of days"
                .to_string(),
        ));
    }
    if recommendation.profile_cache_ttl_secs > MAX_PROFILE_CACHE_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "recommendation.profile_cache_ttl_secs must be at most {MAX_PROFILE_CACHE_TTL_SECS}"
        )));
    }

    Ok(())
}

fn validate_ratio(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must be within [0, 1], got {value}")))
    }
}

fn validate_diversity(diversity: &DiversityConfig) -> Result<(), ConfigError> {
    let caps = [
        ("diversity.window_size", diversity.window_size),
        ("diversity.max_same_category", diversity.max_same_category),
        ("diversity.max_same_brand", diversity.max_same_brand),
        ("diversity.max_same_price_range", diversity.max_same_price_range),
        ("diversity.max_same_style", diversity.max_same_style),
    ];
    for (key, value) in caps {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
        }
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "session.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if session.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "session.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    if session.max_recent == 0 {
        return Err(ConfigError::Validation(
            "session.max_recent must be greater than zero".to_string(),
        ));
    }
    if session.analysis_window == 0 || session.analysis_window > session.max_recent {
        return Err(ConfigError::Validation(
            "session.analysis_window must be in range 1..=session.max_recent".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Replaces `target` when `key` is set; an unparsable value is an error
/// rather than a silent fallback to the previous layer.
fn override_from_env<T: FromStr>(target: &mut T, key: &str) -> Result<(), ConfigError> {
    if let Some(value) = read_env(key) {
        *target = value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value })?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    recommendation: Option<RecommendationPatch>,
    diversity: Option<DiversityPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    default_limit: Option<usize>,
    pool_multiplier: Option<usize>,
    history_limit: Option<usize>,
    noise_ratio: Option<f64>,
    explore_noise_ratio: Option<f64>,
    novelty_bonus: Option<f64>,
    require_image: Option<bool>,
    normalize_profiles: Option<bool>,
    time_decay_days: Option<f64>,
    profile_cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DiversityPatch {
    window_size: Option<usize>,
    max_same_category: Option<usize>,
    max_same_brand: Option<usize>,
    max_same_price_range: Option<usize>,
    max_same_style: Option<usize>,
    front_load_slots: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    max_recent: Option<usize>,
    analysis_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn write_config(dir: &TempDir, body: &str) -> Result<std::path::PathBuf, String> {
        let path = dir.path().join("stylematch.toml");
        fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STYLEMATCH_DB_NAME", "from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[database]
url = "sqlite://${TEST_STYLEMATCH_DB_NAME}.db"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env.db",
                "database url should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_STYLEMATCH_DB_NAME"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_STYLEMATCH_UNSET"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(&dir, "[database]\nurl = \"sqlite://${TEST_STYLEMATCH_UNSET}\"\n")?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "TEST_STYLEMATCH_UNSET", "error should name the missing variable")
            }
            other => Err(format!("expected interpolation failure, got {other:?}")),
        }
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STYLEMATCH_LOG_LEVEL", "warn");
        env::set_var("STYLEMATCH_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["STYLEMATCH_LOG_LEVEL", "STYLEMATCH_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STYLEMATCH_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("STYLEMATCH_RECOMMENDATION_NOISE_RATIO", "0.2");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[database]
url = "sqlite://from-file.db"

[recommendation]
noise_ratio = 0.4
default_limit = 12

[diversity]
front_load_slots = 5

[logging]
level = "warn"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                (config.recommendation.noise_ratio - 0.2).abs() < f64::EPSILON,
                "env noise ratio should win over file and defaults",
            )?;
            ensure(config.recommendation.default_limit == 12, "file limit should beat default")?;
            ensure(config.diversity.front_load_slots == 5, "file diversity slots should apply")?;
            ensure(config.session.timeout_secs == 1800, "untouched keys keep their defaults")?;
            Ok(())
        })();

        clear_vars(&["STYLEMATCH_DATABASE_URL", "STYLEMATCH_RECOMMENDATION_NOISE_RATIO"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STYLEMATCH_RECOMMENDATION_NOISE_RATIO", "1.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("recommendation.noise_ratio")
            );
            ensure(has_message, "validation failure should mention recommendation.noise_ratio")
        })();

        clear_vars(&["STYLEMATCH_RECOMMENDATION_NOISE_RATIO"]);
        result
    }

    #[test]
    fn cache_ttl_above_five_minutes_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STYLEMATCH_RECOMMENDATION_PROFILE_CACHE_TTL_SECS", "301");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["STYLEMATCH_RECOMMENDATION_PROFILE_CACHE_TTL_SECS"]);

        ensure(
            matches!(
                outcome,
                Err(ConfigError::Validation(ref message))
                    if message.contains("profile_cache_ttl_secs")
            ),
            "cache ttl over 300 seconds should fail validation",
        )
    }

    #[test]
    fn unparsable_env_override_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("STYLEMATCH_DIVERSITY_WINDOW_SIZE", "five");
        let outcome = AppConfig::load(LoadOptions::default());
        clear_vars(&["STYLEMATCH_DIVERSITY_WINDOW_SIZE"]);

        ensure(
            matches!(
                outcome,
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "STYLEMATCH_DIVERSITY_WINDOW_SIZE"
            ),
            "invalid override should name the offending variable",
        )
    }

    #[test]
    fn engine_config_projects_file_settings() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let mut config = AppConfig::default();
        config.recommendation.time_decay_days = 0.0;
        config.recommendation.normalize_profiles = true;
        config.diversity.max_same_brand = 1;
        config.session.analysis_window = 8;

        let engine = config.engine_config();
        ensure(engine.profile.time_decay_days.is_none(), "zero decay disables decay")?;
        ensure(engine.profile.normalize, "normalization flag should carry over")?;
        ensure(engine.diversity.max_same_brand == 1, "diversity caps should carry over")?;
        ensure(engine.session_rules.analysis_window == 8, "session window should carry over")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;

        config.recommendation.time_decay_days = 14.0;
        ensure(
            config.engine_config().profile.time_decay_days == Some(14.0),
            "positive decay should be passed through",
        )
    }
}
