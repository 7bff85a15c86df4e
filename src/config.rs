//! Configuration for the offline store and sync manager.
//!
//! Configuration is passed to [`OfflineContext`](crate::OfflineContext) constructors
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use offline_sync::config::{OfflineConfig, StoreConfig};
//!
//! let config = OfflineConfig {
//!     store: StoreConfig::at_path("/var/lib/school/offline.db"),
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! OfflineConfig
//! ├── store: StoreConfig      # SQLite file, WAL, size quota
//! └── sync: SyncConfig        # backoff, retry budget, remote timeout, endpoint
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "store": { "sqlite_path": "offline.db", "max_size_bytes": 52428800 },
//!   "sync": { "base_delay_ms": 1000, "backoff_multiplier": 2.0, "max_retries": 3,
//!             "endpoint": "https://api.example.org/sync" }
//! }
//! ```

use crate::error::ContextError;
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `OfflineContext`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Local persistence settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Sync manager settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl OfflineConfig {
    /// Create a config for tests: in-memory store, millisecond backoff.
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig::in_memory(),
            sync: SyncConfig::for_testing(),
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self, ContextError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ContextError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the store or the backoff misbehave.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.store.sqlite_path.trim().is_empty() {
            return Err(ContextError::Config("store.sqlite_path is empty".to_string()));
        }
        if self.store.max_size_bytes == Some(0) {
            return Err(ContextError::Config(
                "store.max_size_bytes must be positive".to_string(),
            ));
        }
        if !self.sync.backoff_multiplier.is_finite() || self.sync.backoff_multiplier < 1.0 {
            return Err(ContextError::Config(format!(
                "sync.backoff_multiplier must be >= 1.0, got {}",
                self.sync.backoff_multiplier
            )));
        }
        if self.sync.request_timeout_ms == 0 {
            return Err(ContextError::Config(
                "sync.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig: SQLite persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Local store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database. `":memory:"` keeps everything in RAM.
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Size quota for the database file. Writes that would grow the file
    /// past it fail with `QUOTA_EXCEEDED`. `None` = unlimited.
    #[serde(default)]
    pub max_size_bytes: Option<u64>,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    2
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "offline_store.db".to_string(),
            wal_mode: true,
            max_size_bytes: None,
            max_connections: 2,
        }
    }
}

impl StoreConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
            max_size_bytes: None,
            max_connections: 1,
        }
    }

    /// File-backed config with defaults.
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            sqlite_path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path == ":memory:"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncConfig: backoff and remote settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Sync manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay before the first automatic retry (ms).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor between consecutive retries.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Automatic retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Ceiling for any single backoff delay (ms).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound on one remote transmission (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Remote batch endpoint for [`HttpRemote`](crate::remote::HttpRemote).
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> usize {
    3
}

fn default_max_delay_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_retries: 3,
            max_delay_ms: 300_000,
            request_timeout_ms: 30_000,
            endpoint: None,
        }
    }
}

impl SyncConfig {
    /// Fast backoff for tests.
    pub fn for_testing() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 1000,
            request_timeout_ms: 500,
            ..Default::default()
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_multiplier,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_config_default() {
        let config = OfflineConfig::default();
        assert_eq!(config.store.sqlite_path, "offline_store.db");
        assert!(config.store.wal_mode);
        assert!(config.store.max_size_bytes.is_none());
        assert_eq!(config.sync.base_delay_ms, 1000);
        assert_eq!(config.sync.backoff_multiplier, 2.0);
        assert_eq!(config.sync.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_config_in_memory() {
        let config = StoreConfig::in_memory();
        assert!(config.is_in_memory());
        assert!(!config.wal_mode);
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = OfflineConfig::from_json(
            r#"{ "store": { "sqlite_path": "school.db" }, "sync": { "max_retries": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.store.sqlite_path, "school.db");
        assert!(config.store.wal_mode);
        assert_eq!(config.store.max_connections, 2);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.base_delay_ms, 1000);
        assert_eq!(config.sync.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = OfflineConfig::from_json("{ not json").unwrap_err();
        assert!(err.to_string().contains("Invalid config JSON"));
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let mut config = OfflineConfig::for_testing();
        config.sync.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        config.sync.backoff_multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quota_and_timeout() {
        let mut config = OfflineConfig::for_testing();
        config.store.max_size_bytes = Some(0);
        assert!(config.validate().is_err());

        let mut config = OfflineConfig::for_testing();
        config.sync.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_from_sync_config() {
        let retry = SyncConfig::default().retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.backoff_factor, 2.0);
        assert_eq!(SyncConfig::default().request_timeout(), Duration::from_secs(30));
    }
}
