//! Host connectivity signal.
//!
//! The host (network monitor, OS hook, UI shell) reports online/offline
//! transitions here. Subscribers get a `watch` receiver, so a late subscriber
//! always sees the current state and only the latest transition matters.

use crate::metrics;
use tokio::sync::watch;
use tracing::info;

/// Shared online/offline flag with change notification.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl Default for ConnectivitySignal {
    /// Hosts that never report connectivity are treated as online.
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySignal {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        metrics::set_online(initially_online);
        Self { tx }
    }

    pub fn set_online(&self) {
        self.set(true);
    }

    pub fn set_offline(&self) {
        self.set(false);
    }

    /// Update the flag. Subscribers are only woken on an actual change.
    pub fn set(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "Connectivity changed");
            metrics::set_online(online);
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
