//! Configuration management for the Ember backtester.
//!
//! Application settings live in a YAML file. The first existing file wins:
//!
//! 1. `./ember.yaml` (next to the run)
//! 2. `~/.ember/config.yaml`
//!
//! When neither exists the defaults are used.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (EMBER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `EMBER_DATA_DIR` → paths.data_dir
//! - `EMBER_RESULT_DIR` → paths.result_dir
//! - `EMBER_TICKER_FILE` → paths.ticker_file
//! - `EMBER_LOG_LEVEL` → observability.log_level
//! - `EMBER_LOG_FORMAT` → observability.log_format
//! - `EMBER_DATA_BASE_URL` → data_source.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file.
pub const LOCAL_CONFIG_FILE: &str = "ember.yaml";

/// Get the user configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ember"),
        |dirs| dirs.home_dir().join(".ember"),
    )
}

/// Get the user configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Filesystem layout used by downloads, runs, and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the CSV price store (`stock/` and `index/` live below it)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Root directory for run results (`{strategy}_{ticker}/` below it)
    #[serde(default = "default_result_dir")]
    pub result_dir: String,

    /// Ticker universe file (`tickers:` list)
    #[serde(default = "default_ticker_file")]
    pub ticker_file: String,

    /// Default run configuration file
    #[serde(default = "default_run_config")]
    pub run_config: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            result_dir: default_result_dir(),
            ticker_file: default_ticker_file(),
            run_config: default_run_config(),
        }
    }
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn result_dir(&self) -> PathBuf {
        expand_path(&self.result_dir)
    }

    pub fn ticker_file(&self) -> PathBuf {
        expand_path(&self.ticker_file)
    }

    pub fn run_config(&self) -> PathBuf {
        expand_path(&self.run_config)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

/// Market data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Chart API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request budget per minute
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Tickers per download batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries for rate-limited or network-failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base wait between retries in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Benchmark/index tickers downloaded into `index/`
    #[serde(default = "default_index_tickers")]
    pub index_tickers: Vec<String>,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            rate_limit_rpm: default_rate_limit_rpm(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            index_tickers: default_index_tickers(),
            user_agent: default_user_agent(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub data_source: DataSourceConfig,
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_from(&local);
        }
        if config_path().exists() {
            return Self::load_from(&config_path());
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML document. An empty document yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `EMBER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("EMBER_DATA_DIR") {
            self.paths.data_dir = dir;
        }
        if let Ok(dir) = std::env::var("EMBER_RESULT_DIR") {
            self.paths.result_dir = dir;
        }
        if let Ok(file) = std::env::var("EMBER_TICKER_FILE") {
            self.paths.ticker_file = file;
        }
        if let Ok(level) = std::env::var("EMBER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("EMBER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(url) = std::env::var("EMBER_DATA_BASE_URL") {
            self.data_source.base_url = url;
        }
    }

    /// Save configuration as YAML.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_data_dir() -> String {
    "data".into()
}

fn default_result_dir() -> String {
    "result".into()
}

fn default_ticker_file() -> String {
    "ticker.yaml".into()
}

fn default_run_config() -> String {
    "config.yaml".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_rate_limit_rpm() -> u32 {
    120
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_batch_size() -> usize {
    50
}

fn default_index_tickers() -> Vec<String> {
    vec!["^GSPC".into(), "SPY".into()]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; ember-backtest)".into()
}
