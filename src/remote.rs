// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote endpoint integration.
//!
//! The sync manager only needs one thing from the backend: accept a batch of
//! queued mutations, or refuse it. [`RemoteSink`] captures that contract so
//! the manager can be driven by HTTP in production and by mocks in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use offline_sync::remote::{BoxFuture, RemoteSink, SyncBatch};
//!
//! struct LoggingRemote;
//!
//! impl RemoteSink for LoggingRemote {
//!     fn push(&self, batch: SyncBatch) -> BoxFuture<'_, ()> {
//!         Box::pin(async move {
//!             println!("would send {} changes", batch.len());
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::error::{SyncError, SyncResult};
use crate::store::QueueEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

const MAX_LOG_BODY_CHARS: usize = 512;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = SyncResult<T>> + Send + 'a>>;

/// One queued mutation together with the data it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    #[serde(flatten)]
    pub entry: QueueEntry,
    /// Current record data for updates; `None` for deletes, or when the key
    /// was deleted after the update was queued.
    pub data: Option<Value>,
}

/// The unit transmitted to the remote: the whole queue, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub changes: Vec<PendingChange>,
}

impl SyncBatch {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Highest queue id in the batch (the acknowledgement cursor).
    pub fn last_id(&self) -> Option<i64> {
        self.changes.iter().map(|c| c.entry.id).max()
    }
}

/// Trait defining what we need from the remote backend.
///
/// An implementation must either durably accept the entire batch and return
/// `Ok(())`, or return an error having applied nothing the caller relies on.
pub trait RemoteSink: Send + Sync + 'static {
    /// Transmit a batch. Called only with non-empty batches.
    fn push(&self, batch: SyncBatch) -> BoxFuture<'_, ()>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "remote"
    }
}

/// Remote that accepts everything (standalone mode / tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRemote;

impl RemoteSink for NoOpRemote {
    fn push(&self, _batch: SyncBatch) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Remote that POSTs each batch as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRemote {
    /// Build a client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl RemoteSink for HttpRemote {
    fn push(&self, batch: SyncBatch) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&batch)
                .send()
                .await
                .map_err(|e| self.map_transport_error(e))?;

            let status = response.status();
            if status.is_success() {
                debug!(endpoint = %self.endpoint, changes = batch.len(), "Batch accepted");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
            if body.chars().count() > MAX_LOG_BODY_CHARS {
                preview.push_str("...");
            }
            Err(SyncError::rejected(status.as_u16(), preview))
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
