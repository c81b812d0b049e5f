//! Retry budget and exponential backoff

use crate::config::schema::QueueConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Attempt budget and backoff curve applied to failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total leases a job may receive, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.backoff_base_ms,
            max_delay_ms: config.backoff_cap_ms,
        }
    }

    /// Delay before the next lease once a job has failed `attempts` times
    ///
    /// `min(base * 2^attempts, cap)` with `attempts` already counting the
    /// failure, so the first retry waits `2 * base`.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        Duration::from_millis(backoff_delay_ms(
            attempts,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Exponential backoff in milliseconds, saturating at `cap_ms`
pub fn backoff_delay_ms(attempts: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let exponent = attempts.min(63);
    base_ms.saturating_mul(1u64 << exponent).min(cap_ms)
}

/// `now + delay`, clamped instead of overflowing
pub fn instant_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
