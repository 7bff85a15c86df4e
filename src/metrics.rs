//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade.
//! Without an installed recorder every call is a no-op.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `offline_sync_`:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track durations

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store write (`update` / `delete`) and its outcome.
pub fn record_store_write(action: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("offline_sync_store_writes_total", "action" => action.to_string(), "status" => status).increment(1);
}

/// Record a store failure by error code.
pub fn record_store_error(code: &str) {
    counter!("offline_sync_store_errors_total", "code" => code.to_string()).increment(1);
}

/// Record SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn store_retries_total(operation: &str) {
    counter!("offline_sync_store_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Set pending queue depth.
pub fn set_queue_depth(depth: usize) {
    gauge!("offline_sync_queue_depth").set(depth as f64);
}

/// One entry appended to the queue.
pub fn increment_queue_depth() {
    gauge!("offline_sync_queue_depth").increment(1.0);
}

/// Record one sync attempt.
pub fn record_sync_attempt(status: &str, entries: usize, duration: Duration) {
    counter!("offline_sync_attempts_total", "status" => status.to_string()).increment(1);
    if entries > 0 {
        counter!("offline_sync_entries_replayed_total").increment(entries as u64);
    }
    histogram!("offline_sync_attempt_duration_seconds").record(duration.as_secs_f64());
}

/// Record a scheduled retry delay.
pub fn record_retry_scheduled(delay: Duration) {
    counter!("offline_sync_retries_scheduled_total").increment(1);
    histogram!("offline_sync_retry_delay_seconds").record(delay.as_secs_f64());
}

/// Record an automatic cycle that gave up.
pub fn record_cycle_exhausted() {
    counter!("offline_sync_cycles_exhausted_total").increment(1);
}

/// Set connectivity gauge (1 = online).
pub fn set_online(online: bool) {
    gauge!("offline_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// Gauge for sync manager state.
pub fn set_sync_state(state: &str) {
    // Encoded as numeric for alerting (0=idle, 1=syncing, 2=waiting to retry)
    let value = match state {
        "Idle" => 0.0,
        "Syncing" => 1.0,
        "RetryScheduled" => 2.0,
        _ => -1.0,
    };
    gauge!("offline_sync_manager_state").set(value);
}
