// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline context: owns the store, connectivity signal and sync manager.
//!
//! Construct once at startup and share. The context runs a listener task
//! that starts an automatic sync cycle every time connectivity is restored.
//!
//! # State Transitions
//!
//! ```text
//!            start()                 shutdown()
//! Created ──────────→ Running ──────────────────→ ShuttingDown ──→ Stopped
//!    │                                                               ↑
//!    └────────────────────────── shutdown() ─────────────────────────┘
//! ```

use crate::config::OfflineConfig;
use crate::connectivity::ConnectivitySignal;
use crate::error::ContextError;
use crate::manager::SyncManager;
use crate::remote::{HttpRemote, NoOpRemote, RemoteSink};
use crate::store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `shutdown()` waits for the listener to stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of an [`OfflineContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextState::Created => write!(f, "Created"),
            ContextState::Running => write!(f, "Running"),
            ContextState::ShuttingDown => write!(f, "ShuttingDown"),
            ContextState::Stopped => write!(f, "Stopped"),
        }
    }
}

pub struct OfflineContext<R: RemoteSink = NoOpRemote> {
    config: OfflineConfig,
    store: Arc<LocalStore>,
    connectivity: ConnectivitySignal,
    manager: Arc<SyncManager<R>>,
    state_tx: watch::Sender<ContextState>,
    /// Context state receiver (for internal use)
    state_rx: watch::Receiver<ContextState>,
    shutdown_tx: watch::Sender<bool>,
    /// Also serializes `start()` and `shutdown()`.
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineContext<NoOpRemote> {
    /// Context whose remote accepts everything (standalone/testing).
    pub fn standalone(config: OfflineConfig) -> Self {
        Self::with_remote(config, Arc::new(NoOpRemote), ConnectivitySignal::default())
    }
}

impl OfflineContext<HttpRemote> {
    /// Context that posts batches to `config.sync.endpoint`.
    pub fn http(config: OfflineConfig) -> Result<Self, ContextError> {
        let endpoint = config
            .sync
            .endpoint
            .as_deref()
            .ok_or_else(|| ContextError::Config("sync.endpoint is required for HTTP sync".to_string()))?;
        let remote = HttpRemote::new(endpoint, config.sync.request_timeout())
            .map_err(|e| ContextError::Config(e.to_string()))?;

        Ok(Self::with_remote(
            config,
            Arc::new(remote),
            ConnectivitySignal::default(),
        ))
    }
}

impl<R: RemoteSink> OfflineContext<R> {
    /// Build the context in `Created` state. Nothing is opened until
    /// [`start()`](Self::start).
    pub fn with_remote(
        config: OfflineConfig,
        remote: Arc<R>,
        connectivity: ConnectivitySignal,
    ) -> Self {
        let store = Arc::new(LocalStore::new(config.store.clone()));
        let manager = Arc::new(SyncManager::new(
            Arc::clone(&store),
            remote,
            connectivity.clone(),
            &config.sync,
        ));
        let (state_tx, state_rx) = watch::channel(ContextState::Created);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Self {
            config,
            store,
            connectivity,
            manager,
            state_tx,
            state_rx,
            shutdown_tx,
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<SyncManager<R>> {
        &self.manager
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }

    pub fn state(&self) -> ContextState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ContextState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    /// Validate config, open the store and spawn the connectivity listener.
    pub async fn start(&self) -> Result<(), ContextError> {
        let mut listener = self.listener.lock().await;
        let state = self.state();
        if state != ContextState::Created {
            return Err(ContextError::InvalidState {
                expected: ContextState::Created.to_string(),
                actual: state.to_string(),
            });
        }

        self.config.validate()?;

        info!(path = %self.config.store.sqlite_path, "Starting offline context");
        self.store.init().await?;

        let handle = tokio::spawn(run_listener(
            Arc::clone(&self.manager),
            self.connectivity.subscribe(),
            self.shutdown_tx.subscribe(),
        ));
        *listener = Some(handle);

        let _ = self.state_tx.send(ContextState::Running);
        info!(
            online = self.connectivity.is_online(),
            remote = self.manager.remote().name(),
            "Offline context running"
        );
        Ok(())
    }

    /// Stop the listener (abandoning any cycle in progress) and close the store.
    ///
    /// Pending queue entries stay on disk for the next run.
    pub async fn shutdown(&self) {
        let mut listener = self.listener.lock().await;
        if self.state() == ContextState::Stopped {
            return;
        }

        info!("Shutting down offline context");
        let _ = self.state_tx.send(ContextState::ShuttingDown);
        self.shutdown_tx.send_replace(true);

        if let Some(handle) = listener.take() {
            match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("Connectivity listener stopped"),
                Ok(Err(e)) => warn!(error = %e, "Connectivity listener panicked"),
                Err(_) => warn!("Connectivity listener did not stop in time"),
            }
        }

        self.store.close().await;

        let _ = self.state_tx.send(ContextState::Stopped);
        info!("Offline context stopped");
    }
}

/// Run an automatic cycle on every offline→online transition until shutdown.
async fn run_listener<R: RemoteSink>(
    manager: Arc<SyncManager<R>>,
    mut online_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut was_online = *online_rx.borrow_and_update();

    loop {
        tokio::select! {
            changed = online_rx.changed() => {
                if changed.is_err() {
                    debug!("Connectivity signal dropped, listener exiting");
                    break;
                }
                let online = *online_rx.borrow_and_update();
                let restored = online && !was_online;
                was_online = online;
                if !restored {
                    continue;
                }

                info!("Connectivity restored, starting sync cycle");
                tokio::select! {
                    report = manager.sync_with_retry() => {
                        if report.is_success() {
                            debug!(attempts = report.attempts, outcome = ?report.outcome, "Sync cycle finished");
                        } else {
                            error!(attempts = report.attempts, outcome = ?report.outcome, "Sync cycle did not complete");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Shutdown during sync cycle");
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Connectivity listener stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use serde_json::json;

    fn test_config() -> OfflineConfig {
        OfflineConfig::for_testing()
    }

    #[test]
    fn test_context_initial_state() {
        let ctx = OfflineContext::standalone(test_config());
        assert_eq!(ctx.state(), ContextState::Created);
        assert!(!ctx.is_running());
        assert!(!ctx.store().is_initialized());
    }

    #[test]
    fn test_context_state_display() {
        assert_eq!(ContextState::Created.to_string(), "Created");
        assert_eq!(ContextState::ShuttingDown.to_string(), "ShuttingDown");
    }

    #[test]
    fn test_http_context_requires_endpoint() {
        let result = OfflineContext::http(test_config());
        assert!(matches!(result, Err(ContextError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let ctx = OfflineContext::standalone(test_config());
        ctx.start().await.unwrap();
        assert!(ctx.is_running());
        assert!(ctx.store().is_initialized());

        ctx.shutdown().await;
        assert_eq!(ctx.state(), ContextState::Stopped);
    }

    #[tokio::test]
    async fn test_state_receiver_tracks_lifecycle() {
        let ctx = OfflineContext::standalone(test_config());
        let mut state_rx = ctx.state_receiver();
        assert_eq!(*state_rx.borrow_and_update(), ContextState::Created);

        ctx.start().await.unwrap();
        assert!(state_rx.has_changed().unwrap());
        assert_eq!(*state_rx.borrow_and_update(), ContextState::Running);

        ctx.shutdown().await;
        assert_eq!(*state_rx.borrow_and_update(), ContextState::Stopped);
        assert!(!ctx.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_noop() {
        let ctx = OfflineContext::standalone(test_config());
        ctx.start().await.unwrap();

        ctx.shutdown().await;
        ctx.shutdown().await;
        assert_eq!(ctx.state(), ContextState::Stopped);

        // A stopped context cannot be restarted.
        let err = ctx.start().await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let ctx = OfflineContext::standalone(test_config());
        ctx.start().await.unwrap();

        let err = ctx.start().await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidState { .. }));
        assert!(ctx.is_running());

        ctx.shutdown().await;
        assert_eq!(ctx.state(), ContextState::Stopped);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = test_config();
        config.store = StoreConfig::at_path("");
        let ctx = OfflineContext::standalone(config);

        assert!(matches!(ctx.start().await, Err(ContextError::Config(_))));
        assert_eq!(ctx.state(), ContextState::Created);
    }

    #[tokio::test]
    async fn test_shutdown_from_created() {
        let ctx = OfflineContext::standalone(test_config());
        ctx.shutdown().await;
        assert_eq!(ctx.state(), ContextState::Stopped);
    }

    #[tokio::test]
    async fn test_reconnect_drains_queue() {
        let connectivity = ConnectivitySignal::new(false);
        let ctx = OfflineContext::with_remote(test_config(), Arc::new(NoOpRemote), connectivity);
        ctx.start().await.unwrap();

        ctx.store().save("draft", &json!({"title": "offline"})).await.unwrap();
        assert_eq!(ctx.store().pending_count().await.unwrap(), 1);

        ctx.connectivity().set_online();

        let mut drained = false;
        for _ in 0..100 {
            if ctx.store().pending_count().await.unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained, "queue should drain after reconnect");

        ctx.shutdown().await;
    }
}
