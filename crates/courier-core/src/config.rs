//! Queue configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on live requests; admission control evicts beyond it.
    pub max_queue_size: usize,

    /// Used when a request spec does not set `max_retries`.
    pub default_max_retries: u32,

    /// Hard deadline of one HTTP attempt.
    pub request_timeout_ms: u64,

    /// Period of the sync timer.
    pub sync_interval_ms: u64,

    /// Period of connectivity polling.
    pub network_poll_interval_ms: u64,

    /// Deadline of one connectivity probe.
    pub probe_timeout_ms: u64,

    /// Storage key the snapshot lives under.
    pub storage_key: String,

    /// Prefix for relative (`/path`) endpoints.
    pub base_url: Option<String>,

    /// `host:port` probed for connectivity.
    pub probe_addr: Option<String>,

    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            default_max_retries: 3,
            request_timeout_ms: 30_000,
            sync_interval_ms: 30_000,
            network_poll_interval_ms: 5_000,
            probe_timeout_ms: 2_000,
            storage_key: "offline_queue".to_string(),
            base_url: None,
            probe_addr: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff between passes for a failing request. `base_delay_ms = 0` disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 300_000,
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("max_queue_size must be > 0".into()));
        }
        if self.default_max_retries == 0 {
            return Err(ConfigError::Invalid(
                "default_max_retries must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("sync_interval_ms", self.sync_interval_ms),
            ("network_poll_interval_ms", self.network_poll_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_key is empty".into()));
        }
        if let Some(base) = &self.base_url
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "base_url {base:?} must start with http:// or https://"
            )));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be a finite number >= 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn network_poll_interval(&self) -> Duration {
        Duration::from_millis(self.network_poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
