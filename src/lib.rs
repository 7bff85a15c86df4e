//! # Offline Sync
//!
//! An offline-first key-value store with a durable mutation queue, and a sync
//! manager that replays the queue to a remote backend when connectivity
//! returns.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              OfflineContext                               │
//! │                                                                           │
//! │  save/delete  ┌──────────────────────────┐                                │
//! │ ─────────────►│ LocalStore (SQLite)      │                                │
//! │               │  data       sync_queue   │                                │
//! │               └──────────────────────────┘                                │
//! │                     ▲ read queue / ack                                    │
//! │                     │                                                     │
//! │  ┌──────────────────┴─┐   online    ┌────────────────────┐   push batch   │
//! │  │ ConnectivitySignal │────────────►│ SyncManager        │──────────────► │
//! │  │ (watch<bool>)      │             │ (backoff + retry)  │   RemoteSink   │
//! │  └────────────────────┘             └────────────────────┘                │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `save`/`delete` commits the record change and its queue entry in one
//! SQLite transaction. The sync manager sends the whole queue as one batch and
//! removes the transmitted entries only after the remote accepts it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync::{OfflineConfig, OfflineContext};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = OfflineContext::standalone(OfflineConfig::default());
//!     ctx.start().await.expect("Failed to start");
//!
//!     ctx.store().save("timetable", &json!({"week": 12})).await.expect("save");
//!     ctx.manager().sync().await.expect("sync");
//!
//!     ctx.shutdown().await;
//! }
//! ```

pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod remote;
pub mod resilience;
pub mod store;

// Re-exports for convenience
pub use config::{OfflineConfig, StoreConfig, SyncConfig};
pub use connectivity::ConnectivitySignal;
pub use context::{ContextState, OfflineContext};
pub use error::{ContextError, ErrorKind, ErrorReport, Result, StoreError, SyncError, SyncResult};
pub use manager::{CycleOutcome, SyncManager, SyncOutcome, SyncReport, SyncState};
pub use remote::{BoxFuture, HttpRemote, NoOpRemote, PendingChange, RemoteSink, SyncBatch};
pub use resilience::RetryConfig;
pub use store::{LocalStore, QueueEntry, Record, SyncAction};
