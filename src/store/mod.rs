// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable key-value store with an attached mutation queue.
//!
//! Two SQLite tables back the store:
//!
//! ```text
//! data        item_key TEXT PK │ payload JSON │ written_at │ synced
//! sync_queue  id AUTOINCREMENT │ item_key     │ op         │ written_at
//! ```
//!
//! Every `save()`/`delete()` touches both tables inside one transaction, so a
//! record change is never visible without its queue entry (and vice versa).
//!
//! # Lazy Open
//!
//! The pool is opened on first use (or explicitly via `init()`) and cached
//! for the life of the store. A failed open is not cached: the next call
//! tries again.
//!
//! # Size Quota
//!
//! When `max_size_bytes` is configured, every connection sets
//! `PRAGMA max_page_count` so SQLite answers SQLITE_FULL instead of growing
//! the file. Those failures surface as `QuotaExceeded`.
//!
//! # SQLite Busy Handling
//!
//! SQLITE_BUSY/SQLITE_LOCKED mean another connection holds the write lock.
//! Transactions are re-run with capped exponential backoff before giving up.
//! No other failure is retried here.

mod types;

pub use types::{QueueEntry, Record, SyncAction};

use crate::config::StoreConfig;
use crate::error::{ErrorReport, Result, StoreError};
use crate::metrics;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

const SQLITE_PAGE_SIZE: u64 = 4096;

/// Callback receiving a structured report for every failed operation.
pub type ErrorHandler = Arc<dyn Fn(&ErrorReport) + Send + Sync>;

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(operation_name: &str, mut f: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                metrics::store_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts,
                        "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn open_pool(config: &StoreConfig) -> Result<SqlitePool> {
    info!(path = %config.sqlite_path, "Opening offline store");

    let mut options = if config.is_in_memory() {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::init_msg(format!("Invalid SQLite options: {}", e)))?
    } else {
        SqliteConnectOptions::new()
            .filename(&config.sqlite_path)
            .create_if_missing(true)
    };
    options = options
        .page_size(SQLITE_PAGE_SIZE as u32)
        .synchronous(SqliteSynchronous::Normal);
    if config.wal_mode && !config.is_in_memory() {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let max_pages = config
        .max_size_bytes
        .map(|bytes| (bytes / SQLITE_PAGE_SIZE).max(1));

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                if let Some(pages) = max_pages {
                    sqlx::query(&format!("PRAGMA max_page_count = {}", pages))
                        .execute(&mut *conn)
                        .await?;
                }
                Ok(())
            })
        });
    if config.is_in_memory() {
        // Each in-memory connection is its own database: pin exactly one.
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(StoreError::init)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data (
            item_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            written_at INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(StoreError::init)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_key TEXT NOT NULL,
            op TEXT NOT NULL CHECK (op IN ('update', 'delete')),
            written_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(StoreError::init)?;

    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(&pool)
        .await
        .map_err(StoreError::init)?;
    if pending > 0 {
        info!(pending, "Restored pending sync queue from previous run");
    }
    metrics::set_queue_depth(pending as usize);

    Ok(pool)
}

/// Offline key-value store backed by SQLite.
///
/// Cheap to construct; the database is opened lazily. Share it behind an
/// `Arc` (the [`OfflineContext`](crate::OfflineContext) does this).
pub struct LocalStore {
    config: StoreConfig,
    pool: OnceCell<SqlitePool>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl LocalStore {
    /// Create a store without touching the disk.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
            error_handler: RwLock::new(None),
        }
    }

    /// Create a store and open it immediately.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.init().await?;
        Ok(store)
    }

    /// Open the database and create both tables. Idempotent.
    pub async fn init(&self) -> Result<()> {
        let result = self.pool().await.map(|_| ());
        self.observe(result)
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Register a hook that receives every failure, in addition to the `Err`.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ErrorReport) + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.error_handler.write() {
            *guard = Some(Arc::new(handler));
        }
    }

    pub fn clear_error_handler(&self) {
        if let Ok(mut guard) = self.error_handler.write() {
            *guard = None;
        }
    }

    /// Upsert `key` and append an `update` entry, atomically.
    pub async fn save(&self, key: &str, data: &Value) -> Result<()> {
        let result = match serde_json::to_string(data) {
            Ok(payload) => self.write_with_entry("save", key, SyncAction::Update, Some(payload)).await,
            Err(e) => Err(StoreError::operation_msg("save", format!("Unserializable value: {}", e))),
        };
        self.observe(result)
    }

    /// Remove `key` and append a `delete` entry, atomically.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let result = self.write_with_entry("delete", key, SyncAction::Delete, None).await;
        self.observe(result)
    }

    /// Data stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let result = self.fetch_record(key).await.map(|r| r.map(|record| record.data));
        self.observe(result)
    }

    /// Full record (with timestamp and synced flag) for `key`.
    pub async fn get_record(&self, key: &str) -> Result<Option<Record>> {
        let result = self.fetch_record(key).await;
        self.observe(result)
    }

    /// Every record. No ordering guarantee.
    pub async fn get_all(&self) -> Result<Vec<Record>> {
        let result = self.fetch_all().await;
        self.observe(result)
    }

    /// Pending mutations, oldest first.
    pub async fn get_sync_queue(&self) -> Result<Vec<QueueEntry>> {
        let result = self.fetch_queue().await;
        self.observe(result)
    }

    /// Number of pending mutations.
    pub async fn pending_count(&self) -> Result<usize> {
        let result = self.count_pending().await;
        self.observe(result)
    }

    /// Discard every pending mutation. Idempotent.
    pub async fn clear_sync_queue(&self) -> Result<()> {
        let result = self.delete_queue().await;
        self.observe(result)
    }

    /// Drop entries up to and including `last_id` after a confirmed replay,
    /// and mark records with nothing left in the queue as synced.
    ///
    /// Entries appended after `last_id` (writes that raced the sync) stay.
    /// Returns the number of entries removed.
    pub async fn acknowledge_through(&self, last_id: i64) -> Result<u64> {
        let result = self.delete_queue_through(last_id).await;
        if let Ok(depth) = self.count_pending().await {
            metrics::set_queue_depth(depth);
        }
        self.observe(result)
    }

    /// Checkpoint WAL and close the pool.
    pub async fn close(&self) {
        let Some(pool) = self.pool.get() else {
            return;
        };

        if self.config.wal_mode && !self.config.is_in_memory() {
            let checkpoint = execute_with_retry("checkpoint", || async {
                sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
            })
            .await;
            if let Err(e) = checkpoint {
                warn!(error = %e, "Failed to checkpoint WAL on close");
            }
        }
        pool.close().await;
        info!("Offline store closed");
    }

    /// Database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.config.sqlite_path
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool.get_or_try_init(|| open_pool(&self.config)).await
    }

    async fn fetch_record(&self, key: &str) -> Result<Option<Record>> {
        let pool = self.pool().await?;
        let row: Option<(String, String, i64, bool)> = sqlx::query_as(
            "SELECT item_key, payload, written_at, synced FROM data WHERE item_key = ?",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::operation("get", e))?;

        row.map(decode_record).transpose()
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let pool = self.pool().await?;
        let rows: Vec<(String, String, i64, bool)> =
            sqlx::query_as("SELECT item_key, payload, written_at, synced FROM data")
                .fetch_all(pool)
                .await
                .map_err(|e| StoreError::operation("get_all", e))?;

        rows.into_iter().map(decode_record).collect()
    }

    async fn fetch_queue(&self) -> Result<Vec<QueueEntry>> {
        let pool = self.pool().await?;
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, item_key, op, written_at FROM sync_queue ORDER BY id ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::operation("get_sync_queue", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, key, op, timestamp) in rows {
            let action = SyncAction::parse(&op).ok_or_else(|| {
                StoreError::operation_msg(
                    "get_sync_queue",
                    format!("Unknown queue action '{}' for entry {}", op, id),
                )
            })?;
            entries.push(QueueEntry {
                id,
                key,
                action,
                timestamp,
            });
        }
        Ok(entries)
    }

    async fn count_pending(&self) -> Result<usize> {
        let pool = self.pool().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(pool)
            .await
            .map_err(|e| StoreError::operation("pending_count", e))?;
        Ok(count as usize)
    }

    async fn delete_queue(&self) -> Result<()> {
        let pool = self.pool().await?;
        let removed = execute_with_retry("clear_sync_queue", || async {
            sqlx::query("DELETE FROM sync_queue").execute(pool).await
        })
        .await
        .map_err(|e| StoreError::operation("clear_sync_queue", e))?
        .rows_affected();

        info!(removed, "Sync queue cleared");
        metrics::set_queue_depth(0);
        Ok(())
    }

    async fn delete_queue_through(&self, last_id: i64) -> Result<u64> {
        let pool = self.pool().await?;
        let removed = execute_with_retry("acknowledge", || async {
            let mut tx = pool.begin().await?;
            let removed = sqlx::query("DELETE FROM sync_queue WHERE id <= ?")
                .bind(last_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query(
                r#"
                UPDATE data SET synced = 1
                WHERE synced = 0
                  AND item_key NOT IN (SELECT item_key FROM sync_queue)
                "#,
            )
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(removed)
        })
        .await
        .map_err(|e| StoreError::operation("acknowledge", e))?;

        debug!(last_id, removed, "Acknowledged replayed entries");
        Ok(removed)
    }

    async fn write_with_entry(
        &self,
        operation: &str,
        key: &str,
        action: SyncAction,
        payload: Option<String>,
    ) -> Result<()> {
        let pool = self.pool().await?;
        let now = now_millis();
        let payload = &payload;

        let result = execute_with_retry(operation, || async {
            let mut tx = pool.begin().await?;
            match payload {
                Some(json) => {
                    sqlx::query(
                        r#"
                        INSERT INTO data (item_key, payload, written_at, synced)
                        VALUES (?, ?, ?, 0)
                        ON CONFLICT(item_key) DO UPDATE SET
                            payload = excluded.payload,
                            written_at = excluded.written_at,
                            synced = 0
                        "#,
                    )
                    .bind(key)
                    .bind(json)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM data WHERE item_key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
            sqlx::query("INSERT INTO sync_queue (item_key, op, written_at) VALUES (?, ?, ?)")
                .bind(key)
                .bind(action.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            tx.commit().await
        })
        .await;

        match result {
            Ok(()) => {
                metrics::record_store_write(action.as_str(), true);
                metrics::increment_queue_depth();
                debug!(key = %key, action = %action, "Write queued for sync");
                Ok(())
            }
            Err(e) => {
                metrics::record_store_write(action.as_str(), false);
                Err(StoreError::operation(operation, e))
            }
        }
    }

    /// Route failures to the registered hook and metrics, then pass through.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let report = ErrorReport::from_error(err);
            warn!(code = %report.kind, error = %err, "Offline store operation failed");
            metrics::record_store_error(report.kind.code());

            let handler = self
                .error_handler
                .read()
                .ok()
                .and_then(|guard| guard.clone());
            if let Some(handler) = handler {
                handler(&report);
            }
        }
        result
    }
}

fn decode_record((key, payload, timestamp, synced): (String, String, i64, bool)) -> Result<Record> {
    let data = serde_json::from_str(&payload).map_err(|e| {
        StoreError::operation_msg("decode", format!("Corrupt payload for '{}': {}", key, e))
    })?;
    Ok(Record {
        key,
        data,
        timestamp,
        synced,
    })
}
