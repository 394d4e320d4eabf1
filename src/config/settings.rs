//! Configuration settings for offline-ledger.
//!
//! Settings are loaded from `~/.offline-ledger/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::features::conflict::ConflictPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Remote API settings.
    pub remote: RemoteConfig,
    /// Mutation queue settings.
    pub queue: QueueConfig,
    /// Payment queue settings.
    pub payments: PaymentConfig,
    /// Conflict resolution settings.
    pub conflicts: ConflictConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the system of record.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path prefix shared by every endpoint.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// HTTP client timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// API key used when a queued item carries none.
    #[serde(default)]
    pub default_api_key: Option<String>,
}

/// Mutation queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts before an item moves to the dead-letter store.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on a single dispatch, in seconds.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// Abort in-flight dispatches when connectivity drops.
    #[serde(default = "default_true")]
    pub cancel_on_disconnect: bool,
    /// Periodic drain interval while online, in seconds.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

/// Payment queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Explicit retries allowed per payment.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for one gateway call, in seconds.
    #[serde(default = "default_dispatch_timeout")]
    pub call_timeout_secs: u64,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConflictConfig {
    /// Policy applied to every detected conflict.
    pub policy: ConflictPolicy,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions for serde
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_dispatch_timeout() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

const fn default_sync_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            request_timeout_secs: default_request_timeout(),
            default_api_key: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            cancel_on_disconnect: default_true(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            call_timeout_secs: default_dispatch_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl QueueConfig {
    /// Dispatch deadline as a `Duration`.
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Sync tick as a `Duration`.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

impl PaymentConfig {
    /// Gateway call deadline as a `Duration`.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            LedgerError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.remote.base_url, "http://localhost:3000");
        assert_eq!(config.remote.api_prefix, "/api/v1");
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.dispatch_timeout(), Duration::from_secs(30));
        assert!(config.queue.cancel_on_disconnect);
        assert_eq!(config.payments.max_retries, 3);
        assert_eq!(config.conflicts.policy, ConflictPolicy::LatestWrite);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.queue.max_retries, 3);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r#"
queue:
  dispatch_timeout_secs: 5
conflicts:
  policy: manual
"#;
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.queue.dispatch_timeout_secs, 5);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.conflicts.policy, ConflictPolicy::Manual);
        assert_eq!(config.remote.api_prefix, "/api/v1");
    }

    #[test]
    fn test_malformed_config_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "queue: [not, a, map").unwrap();

        let result = Config::load_from_path(&config_path);
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
