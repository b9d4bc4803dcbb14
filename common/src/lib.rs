/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsdigest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default file with an optional override file
- Environment overrides and startup validation (`ConfigError`)
- Helpers to initialize and migrate an SQLite database
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_INTERVAL_HOURS: u64 = 6;
/// One year.
pub const MAX_INTERVAL_HOURS: u64 = 8760;

/// Fatal configuration problems, detected once at startup before any run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration value `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("environment variable `{0}` is not set or empty")]
    MissingEnv(String),
}

/// Database configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/newsdigest.db")
    #[serde(default)]
    pub path: String,
}

/// News source endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: String,
    pub timeout_seconds: Option<u64>,
}

impl SourceConfig {
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(30)
    }
}

/// Remote LLM config (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    /// Article content is truncated to this many characters before prompting
    pub max_content_chars: Option<usize>,
}

impl LlmConfig {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_LLM_API_URL)
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(DEFAULT_LLM_API_KEY_ENV)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(60)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens.unwrap_or(800)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.0)
    }

    pub fn max_content_chars(&self) -> usize {
        self.max_content_chars.unwrap_or(4000)
    }
}

/// Periodic run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_hours: Option<u64>,
    pub run_on_start: Option<bool>,
}

impl SchedulerConfig {
    pub fn interval_hours(&self) -> u64 {
        self.interval_hours.unwrap_or(DEFAULT_INTERVAL_HOURS)
    }

    pub fn run_on_start(&self) -> bool {
        self.run_on_start.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "newsdigest=debug"
    pub level: Option<String>,
    /// Optional log file, rotated daily (`newsdigest.log` -> `newsdigest.2024-01-10.log`)
    pub file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }
}

/// Status server bind settings (used by `serve`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: Option<String>,
    pub port: Option<u16>,
}

impl ServerConfig {
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or("0.0.0.0")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8000)
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply process environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    ///
    /// Recognized keys: NEWS_SOURCE_URL, DATABASE_PATH, LLM_API_URL, LLM_MODEL,
    /// LOG_LEVEL, SCHEDULE_HOURS, PORT.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEWS_SOURCE_URL") {
            self.source.url = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("LLM_API_URL") {
            self.llm.api_url = Some(v);
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = Some(v);
        }
        if let Some(v) = get("SCHEDULE_HOURS") {
            match v.trim().parse::<u64>() {
                Ok(hours) => self.scheduler.interval_hours = Some(hours),
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable SCHEDULE_HOURS"),
            }
        }
        if let Some(v) = get("PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.server.port = Some(port),
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable PORT"),
            }
        }
    }

    /// Check that every required value is present and well-formed, including the
    /// LLM API key environment variable.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.validate_with(|key| std::env::var(key).ok())
    }

    pub fn validate_with<F>(&self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Missing("database.path"));
        }

        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Missing("source.url"));
        }
        let parsed = url::Url::parse(self.source.url.trim()).map_err(|e| ConfigError::Invalid {
            field: "source.url",
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Invalid {
                field: "source.url",
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }

        let hours = self.scheduler.interval_hours();
        if hours == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.interval_hours",
                reason: "must be at least 1".to_string(),
            });
        }
        if hours > MAX_INTERVAL_HOURS {
            return Err(ConfigError::Invalid {
                field: "scheduler.interval_hours",
                reason: format!("{} exceeds the maximum of {}", hours, MAX_INTERVAL_HOURS),
            });
        }

        if self.llm.model().trim().is_empty() {
            return Err(ConfigError::Missing("llm.model"));
        }

        self.api_key_with(lookup).map(|_| ())
    }

    /// Resolve the LLM API key from the environment variable named in `llm.api_key_env`.
    pub fn api_key(&self) -> std::result::Result<String, ConfigError> {
        self.api_key_with(|key| std::env::var(key).ok())
    }

    fn api_key_with<F>(&self, lookup: F) -> std::result::Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = self.llm.api_key_env();
        match lookup(env) {
            Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ConfigError::MissingEnv(env.to_string())),
        }
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run the embedded SQL migrations (`migrations/` at the workspace root) against the pool.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and the DB file if missing, then returns a
/// `SqlitePool` in WAL mode with at most 5 connections. Migrations are the caller's job
/// (`run_migrations`).
///
/// Example:
///   let pool = init_db_pool("data/newsdigest.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Surfaces permission/path problems before sqlx does.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
