//! Bootstrap configuration loading and resolution
//!
//! Every field is resolved with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not fatal: a warning is logged and defaults apply.
//! A TOML file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable overriding `api.base_url`
pub const ENV_API_URL: &str = "CIERRE_API_URL";
/// Environment variable overriding `polling.status_interval_secs`
pub const ENV_POLL_INTERVAL: &str = "CIERRE_POLL_INTERVAL_SECS";
/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "CIERRE_LOG_LEVEL";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
// Reprocessing is a synchronous request that only returns once the job finishes.
const DEFAULT_REPROCESS_TIMEOUT_SECS: u64 = 900;
const DEFAULT_STATUS_INTERVAL_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub api: ApiSection,
    pub polling: PollingSection,
    pub logging: LoggingConfig,
}

/// `[api]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSection {
    /// Base URL of the closure-management REST service
    pub base_url: String,
    /// Timeout for ordinary requests (seconds)
    pub request_timeout_secs: u64,
    /// Timeout for the synchronous reprocess call (seconds)
    pub reprocess_timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            reprocess_timeout_secs: DEFAULT_REPROCESS_TIMEOUT_SECS,
        }
    }
}

/// `[polling]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingSection {
    /// Interval between closure-status polls (seconds)
    pub status_interval_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub reprocess_timeout: Duration,
    pub status_interval: Duration,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            reprocess_timeout: Duration::from_secs(DEFAULT_REPROCESS_TIMEOUT_SECS),
            status_interval: Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Resolves [`ClientConfig`] from CLI, environment, TOML and defaults
pub struct ConfigResolver {
    overrides: CliOverrides,
}

impl ConfigResolver {
    pub fn new(overrides: CliOverrides) -> Self {
        Self { overrides }
    }

    /// Resolve configuration following the priority order
    pub fn resolve(&self) -> Result<ClientConfig> {
        let file = match self.config_file_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                load_toml_config(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                TomlConfig::default()
            }
        };

        let base_url = self
            .overrides
            .api_url
            .clone()
            .or_else(|| non_empty_env(ENV_API_URL))
            .unwrap_or(file.api.base_url);

        let status_interval_secs = match non_empty_env(ENV_POLL_INTERVAL) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_POLL_INTERVAL, raw
                ))
            })?,
            None => file.polling.status_interval_secs,
        };

        let log_level = self
            .overrides
            .log_level
            .clone()
            .or_else(|| non_empty_env(ENV_LOG_LEVEL))
            .unwrap_or(file.logging.level);

        let config = ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(file.api.request_timeout_secs),
            reprocess_timeout: Duration::from_secs(file.api.reprocess_timeout_secs),
            status_interval: Duration::from_secs(status_interval_secs),
            log_level,
        };
        validate(&config)?;

        debug!(?config, "Configuration resolved");
        Ok(config)
    }

    fn config_file_path(&self) -> Option<PathBuf> {
        self.overrides
            .config_path
            .clone()
            .or_else(default_config_path)
    }
}

/// Platform config file location (`<config_dir>/cierre/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cierre").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn validate(config: &ClientConfig) -> Result<()> {
    if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "api.base_url must be an http(s) URL, got '{}'",
            config.base_url
        )));
    }
    if config.request_timeout.is_zero() || config.reprocess_timeout.is_zero() {
        return Err(Error::Config("API timeouts must be greater than zero".to_string()));
    }
    if config.status_interval.is_zero() {
        return Err(Error::Config(
            "polling.status_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
