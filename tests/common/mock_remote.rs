//! Mock RemoteSink for testing.
//!
//! Records every pushed batch for assertions. Can be scripted to fail the
//! first N pushes, fail forever, or block until released (to hold a sync
//! in flight while the test does something else).

use offline_sync::{BoxFuture, RemoteSink, SyncBatch, SyncError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, RwLock};

/// Mock implementation of RemoteSink that records all pushes.
///
/// # Example
/// ```rust,ignore
/// let remote = Arc::new(MockRemote::failing_first(2));
///
/// // Use in a SyncManager...
///
/// assert_eq!(remote.push_count(), 3);
/// let batches = remote.batches().await;
/// ```
pub struct MockRemote {
    /// Recorded push() calls (including failed ones)
    batches: RwLock<Vec<SyncBatch>>,
    /// Counter for push calls
    push_count: AtomicUsize,
    /// Fail while push_count < this
    fail_first: AtomicUsize,
    /// Block each push until `release()` is called
    gated: AtomicBool,
    /// Block each push forever (simulates a hung server)
    hang: AtomicBool,
    gate: Notify,
    /// Signalled when a push starts
    entered: Notify,
}

impl MockRemote {
    /// Create a mock that accepts every batch.
    pub fn new() -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
            push_count: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            gate: Notify::new(),
            entered: Notify::new(),
        }
    }

    /// Fail the first `n` pushes with a transport error, then accept.
    pub fn failing_first(n: usize) -> Self {
        let mock = Self::new();
        mock.fail_first.store(n, Ordering::SeqCst);
        mock
    }

    /// Fail every push.
    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Hold each push until [`release()`](Self::release).
    pub fn gated() -> Self {
        let mock = Self::new();
        mock.gated.store(true, Ordering::SeqCst);
        mock
    }

    /// Never answer.
    pub fn hanging() -> Self {
        let mock = Self::new();
        mock.hang.store(true, Ordering::SeqCst);
        mock
    }

    /// Let one gated push proceed.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Stop gating; pushes from now on return immediately.
    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
        // Covers a push that checked the flag but is not yet waiting.
        self.gate.notify_one();
    }

    /// Wait until a push has started.
    pub async fn wait_for_push(&self) {
        self.entered.notified().await;
    }

    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    pub async fn batches(&self) -> Vec<SyncBatch> {
        self.batches.read().await.clone()
    }

    pub async fn last_batch(&self) -> Option<SyncBatch> {
        self.batches.read().await.last().cloned()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSink for MockRemote {
    fn push(&self, batch: SyncBatch) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let n = self.push_count.fetch_add(1, Ordering::SeqCst);
            self.batches.write().await.push(batch);
            self.entered.notify_one();

            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.gated.load(Ordering::SeqCst) {
                self.gate.notified().await;
            }

            if n < self.fail_first.load(Ordering::SeqCst) {
                return Err(SyncError::Transport(format!("simulated failure #{}", n + 1)));
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
