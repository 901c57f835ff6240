//! Configuration
//!
//! Typed configuration for the engine: TOML files with serde defaults and
//! `EVENTIDE_*` environment variable overrides.
//!
//! ```toml
//! [ingest]
//! batch_size = 10000
//! flush_interval_ms = 500
//!
//! [index]
//! memory_budget_mb = 256
//! max_new_per_tick = 2
//! stale_drop_ms = 604800000
//! adaptive_tick_secs = 60
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ingest buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Events per flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum age of buffered events before a periodic flush
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_flush_interval_ms() -> u64 {
    500
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Adaptive index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Budget the policy packs build recommendations into
    #[serde(default = "default_memory_budget_mb")]
    pub memory_budget_mb: u64,

    /// Most new indexes one adaptive tick may request
    #[serde(default = "default_max_new_per_tick")]
    pub max_new_per_tick: usize,

    /// Indexes unused for this long become drop candidates
    #[serde(default = "default_stale_drop_ms")]
    pub stale_drop_ms: i64,

    /// Seconds between adaptive ticks
    #[serde(default = "default_adaptive_tick_secs")]
    pub adaptive_tick_secs: u64,
}

fn default_memory_budget_mb() -> u64 {
    256
}

fn default_max_new_per_tick() -> usize {
    2
}

fn default_stale_drop_ms() -> i64 {
    604_800_000 // 7 days
}

fn default_adaptive_tick_secs() -> u64 {
    60
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            memory_budget_mb: default_memory_budget_mb(),
            max_new_per_tick: default_max_new_per_tick(),
            stale_drop_ms: default_stale_drop_ms(),
            adaptive_tick_secs: default_adaptive_tick_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Defaults plus environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load from a file, then apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `./eventide.toml` when present, otherwise environment-only
    pub fn load_default() -> Self {
        let path = PathBuf::from("./eventide.toml");
        if path.exists() {
            match Self::load_with_env(&path) {
                Ok(config) => {
                    tracing::info!("loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::warn!("failed to load config from {:?}: {}", path, e);
                }
            }
        }

        tracing::info!("using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("EVENTIDE_INGEST_BATCH_SIZE") {
            self.ingest.batch_size = v;
        }
        if let Some(v) = env_parse("EVENTIDE_INGEST_FLUSH_MS") {
            self.ingest.flush_interval_ms = v;
        }
        if let Some(v) = env_parse("EVENTIDE_INDEX_MEMORY_BUDGET_MB") {
            self.index.memory_budget_mb = v;
        }
        if let Some(v) = env_parse("EVENTIDE_INDEX_MAX_NEW_PER_TICK") {
            self.index.max_new_per_tick = v;
        }
        if let Some(v) = env_parse("EVENTIDE_INDEX_STALE_DROP_MS") {
            self.index.stale_drop_ms = v;
        }
        if let Some(v) = env_parse("EVENTIDE_INDEX_TICK_SECS") {
            self.index.adaptive_tick_secs = v;
        }
        if let Ok(level) = std::env::var("EVENTIDE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EVENTIDE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("failed to parse config {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}
