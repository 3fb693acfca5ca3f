//! Retry policy: decides how long a failing request waits before the next pass
//! may attempt it again.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::RetryConfig;

/// Backoff for requests that failed with a retryable error.
///
/// A zero `base_delay` disables backoff: every pass attempts every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// No backoff.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.base_delay.is_zero()
    }

    /// Delay after the `retry_count`-th failure (1-indexed).
    ///
    /// delay = base_delay * multiplier^(retry_count - 1), capped at `max_delay`.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    /// When the next attempt may happen, or `None` if backoff is disabled.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, retry_count: u32) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        let delay = chrono::Duration::from_std(self.next_delay(retry_count)).ok()?;
        now.checked_add_signed(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}
