// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the offline store and the sync manager.
//!
//! Errors are split by the boundary they cross:
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `StoreError::InitFailed` | Caller decides | SQLite could not be opened |
//! | `StoreError::QuotaExceeded` | No | Size quota reached (user must free space) |
//! | `StoreError::OperationFailed` | Caller decides | Any other transaction failure |
//! | `SyncError::Transport` | Yes | Network unreachable, connection dropped |
//! | `SyncError::Rejected` | 5xx/408/429 only | Remote refused the batch |
//! | `SyncError::Timeout` | Yes | Remote did not answer in time |
//! | `SyncError::Store` | No | Local store failed while syncing |
//!
//! Store errors are always returned to the immediate caller and, when a hook
//! is registered, reported through [`ErrorReport`] as well.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type alias for remote/sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Stable error codes exposed to the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InitFailed,
    QuotaExceeded,
    OperationFailed,
}

impl ErrorKind {
    /// The wire code (`INIT_FAILED`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InitFailed => "INIT_FAILED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Message suitable for showing to an end user.
    ///
    /// Quota and init failures need different user actions, so they get
    /// distinct wording.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InitFailed => "Offline storage is unavailable. Please reload and try again.",
            Self::QuotaExceeded => {
                "Offline storage is full. Please sync or clear pending data to free space."
            }
            Self::OperationFailed => "Saving offline data failed. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened or its schema created.
    #[error("Failed to initialize offline store: {message}")]
    InitFailed {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// SQLite reported the database full (size quota reached).
    #[error("Offline storage quota exceeded during {operation}")]
    QuotaExceeded {
        operation: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Any other transactional failure.
    #[error("Offline store operation failed ({operation}): {message}")]
    OperationFailed {
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl StoreError {
    pub fn init(source: sqlx::Error) -> Self {
        Self::InitFailed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn init_msg(message: impl Into<String>) -> Self {
        Self::InitFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Classify a failed write/read. SQLITE_FULL becomes `QuotaExceeded`.
    pub fn operation(operation: impl Into<String>, source: sqlx::Error) -> Self {
        if is_sqlite_full_error(&source) {
            return Self::QuotaExceeded {
                operation: operation.into(),
                source: Some(source),
            };
        }
        Self::OperationFailed {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn operation_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InitFailed { .. } => ErrorKind::InitFailed,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
        }
    }

    /// Quota errors need user action; the rest may be retried by the caller.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Check if an error is SQLITE_FULL (code 13).
pub(crate) fn is_sqlite_full_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                if code == "13" {
                    return true;
                }
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database or disk is full")
        }
        _ => false,
    }
}

/// Structured notification delivered to a registered error hook.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// Error category.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Unix milliseconds when the failure was observed.
    pub timestamp: i64,
}

impl ErrorReport {
    pub fn from_error(err: &StoreError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Errors from a single sync attempt.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote unreachable or the connection failed mid-request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote answered but refused the batch.
    #[error("Remote rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Remote did not answer within the configured timeout.
    #[error("Remote did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Reading or acknowledging the queue failed.
    #[error("Store error during sync: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is worth another automatic attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Store(_) => false,
        }
    }
}

/// Errors from the context lifecycle.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::InitFailed.code(), "INIT_FAILED");
        assert_eq!(ErrorKind::QuotaExceeded.code(), "QUOTA_EXCEEDED");
        assert_eq!(ErrorKind::OperationFailed.code(), "OPERATION_FAILED");
        assert_eq!(ErrorKind::QuotaExceeded.to_string(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_user_messages_are_distinct() {
        assert_ne!(
            ErrorKind::InitFailed.user_message(),
            ErrorKind::QuotaExceeded.user_message()
        );
        assert!(ErrorKind::QuotaExceeded.user_message().contains("full"));
        assert!(ErrorKind::InitFailed.user_message().contains("unavailable"));
    }

    #[test]
    fn test_store_error_kind() {
        assert_eq!(StoreError::init_msg("no disk").kind(), ErrorKind::InitFailed);
        assert_eq!(
            StoreError::operation_msg("save", "boom").kind(),
            ErrorKind::OperationFailed
        );
        let err = StoreError::operation("save", sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        assert!(!err.is_user_actionable());
    }

    #[test]
    fn test_quota_is_user_actionable() {
        let err = StoreError::QuotaExceeded {
            operation: "save".to_string(),
            source: None,
        };
        assert!(err.is_user_actionable());
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn test_is_sqlite_full_error_non_database() {
        assert!(!is_sqlite_full_error(&sqlx::Error::RowNotFound));
        assert!(!is_sqlite_full_error(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_error_report_serializes_type_field() {
        let report = ErrorReport::from_error(&StoreError::init_msg("missing"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "INIT_FAILED");
        assert!(json["message"].as_str().unwrap().contains("missing"));
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_sync_error_retryable() {
        assert!(SyncError::Transport("reset".into()).is_retryable());
        assert!(SyncError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(SyncError::rejected(503, "busy").is_retryable());
        assert!(SyncError::rejected(429, "slow down").is_retryable());
        assert!(!SyncError::rejected(400, "bad batch").is_retryable());
        assert!(!SyncError::Store(StoreError::operation_msg("read", "x")).is_retryable());
    }

    #[test]
    fn test_rejected_formatting() {
        let msg = SyncError::rejected(422, "invalid key").to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("invalid key"));
    }
}
