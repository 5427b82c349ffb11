//! Application configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::args::CliArgs;
use super::storage::ConfigError;
use crate::application::services::batch_loader::{BatchConfig, DEFAULT_BATCH_PAUSE};
use crate::application::services::refresh_scheduler::{
    DEFAULT_MAX_FAILURES, DEFAULT_REFRESH_INTERVAL, RefreshConfig,
};
use crate::application::services::retry_controller::{MAX_ATTEMPTS_LIMIT, RetryPolicy};
use crate::domain::entities::{AllowList, Environment, EnvironmentMode};

pub(crate) const APP_NAME: &str = "imgrelay";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "imgrelay";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Development or hosted.
    #[serde(default)]
    pub environment: EnvironmentMode,

    /// Origin of the page embedding the images.
    #[serde(default = "default_page_origin")]
    pub page_origin: String,

    /// Upstream hosts eligible for relaying.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Path prefix of the development relay.
    #[serde(default = "default_dev_relay_prefix")]
    pub dev_relay_prefix: String,

    /// Path of the hosted relay.
    #[serde(default = "default_relay_path")]
    pub relay_path: String,

    /// Loader tuning.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Refresh scheduler tuning.
    #[serde(default)]
    pub refresh: RefreshSettings,

    /// Relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Loader tuning. Unset values fall back to per-environment defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Per-attempt timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Retry rounds per load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Concurrent loads per batch group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Pause between batch groups in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Maximum cached payloads.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Freshness window in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl LoaderConfig {
    /// Effective per-attempt timeout.
    #[must_use]
    pub fn timeout(&self, mode: EnvironmentMode) -> Duration {
        self.timeout_secs
            .map_or_else(|| mode.default_timeout(), Duration::from_secs)
    }

    /// Effective retry policy; attempts are capped.
    #[must_use]
    pub fn retry_policy(&self, mode: EnvironmentMode) -> RetryPolicy {
        let attempts = self
            .max_attempts
            .unwrap_or_else(|| mode.default_max_attempts())
            .min(MAX_ATTEMPTS_LIMIT);
        RetryPolicy::new(attempts)
    }

    /// Effective batch configuration.
    #[must_use]
    pub fn batch(&self, mode: EnvironmentMode) -> BatchConfig {
        BatchConfig::new(
            self.batch_size
                .unwrap_or_else(|| mode.default_batch_size()),
            Duration::from_millis(self.batch_pause_ms),
        )
    }

    /// Freshness window.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            max_attempts: None,
            batch_size: None,
            batch_pause_ms: default_batch_pause_ms(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Refresh scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Seconds between passes.
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,

    /// Consecutive failed passes before the circuit opens.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl RefreshSettings {
    /// Converts to the scheduler configuration.
    #[must_use]
    pub fn to_refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            max_failures: self.max_failures.max(1),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            max_failures: default_max_failures(),
        }
    }
}

/// Relay server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Upstream fetch timeout in seconds.
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RelayConfig {
    /// Upstream fetch timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            timeout_secs: default_relay_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_page_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_dev_relay_prefix() -> String {
    "/storage-proxy".to_string()
}

fn default_relay_path() -> String {
    "/api/relay".to_string()
}

#[allow(clippy::cast_possible_truncation)]
fn default_batch_pause_ms() -> u64 {
    DEFAULT_BATCH_PAUSE.as_millis() as u64
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_max_failures() -> u32 {
    DEFAULT_MAX_FAILURES
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_relay_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    crate::infrastructure::image::USER_AGENT.to_string()
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(environment) = args.environment {
            self.environment = environment;
        }
        if let Some(page_origin) = &args.page_origin {
            self.page_origin.clone_from(page_origin);
        }
        if !args.allowed_hosts.is_empty() {
            self.allowed_hosts.clone_from(&args.allowed_hosts);
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.loader.timeout_secs = Some(timeout_secs);
        }
        if let Some(max_attempts) = args.max_attempts {
            self.loader.max_attempts = Some(max_attempts);
        }
        if let Some(batch_size) = args.batch_size {
            self.loader.batch_size = Some(batch_size);
        }
    }

    /// Builds the routing environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidOrigin`] if `page_origin` is not an absolute http(s) URL.
    pub fn environment(&self) -> Result<Environment, ConfigError> {
        let origin = Url::parse(&self.page_origin)
            .map_err(|e| ConfigError::InvalidOrigin(format!("{}: {e}", self.page_origin)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidOrigin(format!(
                "{}: unsupported scheme",
                self.page_origin
            )));
        }

        Ok(Environment::new(
            self.environment,
            origin,
            AllowList::new(&self.allowed_hosts),
        )
        .with_dev_relay_prefix(&self.dev_relay_prefix)
        .with_relay_path(&self.relay_path))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            environment: EnvironmentMode::default(),
            page_origin: default_page_origin(),
            allowed_hosts: Vec::new(),
            dev_relay_prefix: default_dev_relay_prefix(),
            relay_path: default_relay_path(),
            loader: LoaderConfig::default(),
            refresh: RefreshSettings::default(),
            relay: RelayConfig::default(),
        }
    }
}
