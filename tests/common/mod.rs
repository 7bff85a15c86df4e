//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock RemoteSink for recording pushed batches
//! - Store and manager construction helpers

#![allow(dead_code)]

pub mod mock_remote;

pub use mock_remote::*;

use offline_sync::{ConnectivitySignal, LocalStore, StoreConfig, SyncConfig, SyncManager};
use std::sync::Arc;
use tempfile::TempDir;

/// Open a store on a fresh file inside `dir`.
pub async fn file_store(dir: &TempDir) -> Arc<LocalStore> {
    let path = dir.path().join("offline.db");
    let store = LocalStore::open(StoreConfig::at_path(path.to_string_lossy()))
        .await
        .expect("open store");
    Arc::new(store)
}

/// Build a manager over `store` with millisecond backoff.
pub fn manager(
    store: Arc<LocalStore>,
    remote: Arc<MockRemote>,
    connectivity: ConnectivitySignal,
) -> SyncManager<MockRemote> {
    SyncManager::new(store, remote, connectivity, &SyncConfig::for_testing())
}
