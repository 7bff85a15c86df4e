//! Retry and backoff policy for automatic sync cycles.
//!
//! # Backoff Schedule (defaults)
//!
//! ```text
//! Retry  Delay    Cumulative
//! -----  -----    ----------
//! 0      1s       1s
//! 1      2s       3s
//! 2      4s       7s
//! (3 retries exhausted: cycle abandoned, back to Idle)
//! ```

use std::time::Duration;

/// Configuration for automatic sync retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt fails.
    pub max_retries: usize,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Delay before retry number `retry` (0-indexed): `initial × factor^retry`.
    pub fn delay_for_attempt(&self, retry: usize) -> Duration {
        let exponent = retry.min(i32::MAX as usize) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_nanos = (self.initial_delay.as_nanos() as f64 * multiplier).round();
        if !delay_nanos.is_finite() || delay_nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_nanos(delay_nanos as u64), self.max_delay)
    }

    /// Whether another retry may be scheduled after `retries_done` retries.
    pub fn should_retry(&self, retries_done: usize) -> bool {
        retries_done < self.max_retries
    }
}
