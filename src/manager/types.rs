//! Sync manager state and result types.
//!
//! # State Transitions
//!
//! ```text
//!             sync() / connectivity restored
//!   Idle ─────────────────────────────────→ Syncing
//!    ↑                                         │
//!    │ success, or retries exhausted           │ attempt failed (automatic cycle)
//!    └─────────────────────────────────────────┤
//!                                              ↓
//!                                       RetryScheduled
//!                                              │ backoff elapsed
//!                                              └──────→ Syncing
//! ```

use std::time::Duration;

/// State of the sync manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight.
    Idle,

    /// An attempt is transmitting the queue.
    Syncing,

    /// An automatic cycle is waiting out a backoff delay.
    ///
    /// Not counted as syncing: an explicit `sync()` may run meanwhile.
    RetryScheduled,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "Idle"),
            SyncState::Syncing => write!(f, "Syncing"),
            SyncState::RetryScheduled => write!(f, "RetryScheduled"),
        }
    }
}

/// Result of one successful (or skipped) sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Host is offline; nothing attempted.
    Offline,
    /// Another attempt was in flight; this request was dropped.
    AlreadySyncing,
    /// Queue was empty; the remote was not contacted.
    Empty,
    /// The remote accepted the batch and it was acknowledged locally.
    Synced { entries: usize },
}

/// How an automatic cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An attempt finished without error.
    Completed(SyncOutcome),
    /// Every retry failed; the cycle was abandoned.
    Exhausted { last_error: String },
    /// Another automatic cycle was already running.
    CycleInProgress,
}

/// Summary of an automatic cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: CycleOutcome,
    /// Attempts made, including the first one.
    pub attempts: usize,
    /// Backoff delays slept between attempts, in order.
    pub delays: Vec<Duration>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_display() {
        assert_eq!(SyncState::Idle.to_string(), "Idle");
        assert_eq!(SyncState::Syncing.to_string(), "Syncing");
        assert_eq!(SyncState::RetryScheduled.to_string(), "RetryScheduled");
    }

    #[test]
    fn test_report_success() {
        let report = SyncReport {
            outcome: CycleOutcome::Completed(SyncOutcome::Synced { entries: 2 }),
            attempts: 1,
            delays: vec![],
        };
        assert!(report.is_success());

        let exhausted = SyncReport {
            outcome: CycleOutcome::Exhausted {
                last_error: "timeout".to_string(),
            },
            attempts: 4,
            delays: vec![Duration::from_secs(1)],
        };
        assert!(!exhausted.is_success());
    }
}
