// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync manager: replays the local mutation queue against the remote.
//!
//! Two entry points with different error contracts:
//!
//! - [`SyncManager::sync()`] makes exactly one attempt and returns its error
//!   to the caller. Used for explicit, user-initiated syncs.
//! - [`SyncManager::sync_with_retry()`] runs an automatic cycle with
//!   exponential backoff and never returns an error; exhaustion is logged and
//!   reported in the [`SyncReport`].
//!
//! # Replay Semantics
//!
//! The whole queue is transmitted as one batch. Only after the remote accepts
//! it are the transmitted entries (`id <= last id in batch`) removed, in one
//! local transaction. A failure at any point leaves the queue untouched.
//! If the local acknowledgement fails after the remote accepted, the batch is
//! sent again on the next attempt, so the remote should treat replays of the
//! same entry ids as idempotent.

mod types;

pub use types::{CycleOutcome, SyncOutcome, SyncReport, SyncState};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivitySignal;
use crate::error::{Result, SyncError, SyncResult};
use crate::metrics;
use crate::remote::{NoOpRemote, PendingChange, RemoteSink, SyncBatch};
use crate::resilience::RetryConfig;
use crate::store::{LocalStore, QueueEntry, SyncAction};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Clears an in-flight flag when dropped (including on cancellation).
struct FlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Coordinates replay of the local queue to a [`RemoteSink`].
pub struct SyncManager<R: RemoteSink = NoOpRemote> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    connectivity: ConnectivitySignal,
    retry: RetryConfig,
    request_timeout: Duration,
    /// An attempt is transmitting right now.
    syncing: AtomicBool,
    /// An automatic cycle (attempts plus backoff sleeps) is running.
    auto_cycle: AtomicBool,
    state_tx: watch::Sender<SyncState>,
}

impl<R: RemoteSink> SyncManager<R> {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<R>,
        connectivity: ConnectivitySignal,
        config: &SyncConfig,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(SyncState::Idle);
        Self {
            store,
            remote,
            connectivity,
            retry: config.retry_config(),
            request_timeout: config.request_timeout(),
            syncing: AtomicBool::new(false),
            auto_cycle: AtomicBool::new(false),
            state_tx,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Whether an attempt is transmitting right now.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn is_currently_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// The queue as it stands now, oldest first.
    pub async fn get_pending_changes(&self) -> Result<Vec<QueueEntry>> {
        self.store.get_sync_queue().await
    }

    /// Drop every pending change without sending it (explicit user action).
    pub async fn discard_pending_changes(&self) -> Result<()> {
        warn!("Discarding all pending changes");
        self.store.clear_sync_queue().await
    }

    /// Make one sync attempt. Failures are returned, not retried.
    ///
    /// No-op while offline, while another attempt is in flight, or when the
    /// queue is empty.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        if !self.is_currently_online() {
            debug!("Offline, skipping sync");
            return Ok(SyncOutcome::Offline);
        }

        let Some(_guard) = FlagGuard::acquire(&self.syncing) else {
            debug!("Sync already in flight, request ignored");
            return Ok(SyncOutcome::AlreadySyncing);
        };

        self.set_state(SyncState::Syncing);
        let started = Instant::now();
        let result = self.attempt().await;
        let elapsed = started.elapsed();
        self.set_state(SyncState::Idle);

        match &result {
            Ok(SyncOutcome::Synced { entries }) => {
                info!(
                    remote = self.remote.name(),
                    entries,
                    duration_ms = elapsed.as_millis() as u64,
                    "Sync completed"
                );
                metrics::record_sync_attempt("success", *entries, elapsed);
            }
            Ok(_) => {
                metrics::record_sync_attempt("empty", 0, elapsed);
            }
            Err(e) => {
                warn!(remote = self.remote.name(), error = %e, retryable = e.is_retryable(), "Sync attempt failed");
                metrics::record_sync_attempt("failure", 0, elapsed);
            }
        }

        result
    }

    /// Run an automatic cycle: attempt, then back off and retry on failure
    /// until `max_retries` retries have failed. Never returns an error.
    pub async fn sync_with_retry(&self) -> SyncReport {
        let Some(_cycle) = FlagGuard::acquire(&self.auto_cycle) else {
            debug!("Automatic sync cycle already running");
            return SyncReport {
                outcome: CycleOutcome::CycleInProgress,
                attempts: 0,
                delays: Vec::new(),
            };
        };

        let mut delays = Vec::new();
        let mut retries = 0usize;

        loop {
            match self.sync().await {
                Ok(outcome) => {
                    if retries > 0 {
                        info!(retries, "Sync succeeded after retry");
                    }
                    return SyncReport {
                        outcome: CycleOutcome::Completed(outcome),
                        attempts: retries + 1,
                        delays,
                    };
                }
                Err(e) if self.retry.should_retry(retries) => {
                    let delay = self.retry.delay_for_attempt(retries);
                    warn!(
                        retry = retries + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Scheduling sync retry"
                    );
                    metrics::record_retry_scheduled(delay);
                    self.set_state(SyncState::RetryScheduled);
                    delays.push(delay);

                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => {
                    error!(
                        attempts = retries + 1,
                        error = %e,
                        "Sync retries exhausted, giving up until next trigger"
                    );
                    metrics::record_cycle_exhausted();
                    self.set_state(SyncState::Idle);
                    return SyncReport {
                        outcome: CycleOutcome::Exhausted {
                            last_error: e.to_string(),
                        },
                        attempts: retries + 1,
                        delays,
                    };
                }
            }
        }
    }

    /// Start an automatic cycle in the background.
    pub fn spawn_sync_with_retry(self: &Arc<Self>) -> tokio::task::JoinHandle<SyncReport> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.sync_with_retry().await })
    }

    async fn attempt(&self) -> SyncResult<SyncOutcome> {
        let queue = self.store.get_sync_queue().await?;
        if queue.is_empty() {
            debug!("Sync queue empty, nothing to replay");
            return Ok(SyncOutcome::Empty);
        }

        let batch = self.build_batch(queue).await?;
        let entries = batch.len();
        let Some(last_id) = batch.last_id() else {
            return Ok(SyncOutcome::Empty);
        };

        debug!(entries, last_id, remote = self.remote.name(), "Transmitting sync batch");
        match tokio::time::timeout(self.request_timeout, self.remote.push(batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SyncError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }

        self.store.acknowledge_through(last_id).await?;
        Ok(SyncOutcome::Synced { entries })
    }

    /// Pair each entry with the record's current data.
    async fn build_batch(&self, queue: Vec<QueueEntry>) -> Result<SyncBatch> {
        let mut current: HashMap<String, Option<Value>> = HashMap::new();
        let mut changes = Vec::with_capacity(queue.len());

        for entry in queue {
            let data = match entry.action {
                SyncAction::Delete => None,
                SyncAction::Update => match current.get(&entry.key) {
                    Some(data) => data.clone(),
                    None => {
                        let data = self.store.get(&entry.key).await?;
                        current.insert(entry.key.clone(), data.clone());
                        data
                    }
                },
            };
            changes.push(PendingChange { entry, data });
        }

        Ok(SyncBatch { changes })
    }

    fn set_state(&self, state: SyncState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            metrics::set_sync_state(&state.to_string());
        }
    }
}
