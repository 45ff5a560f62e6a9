//! Bounded exponential backoff for repeated sync attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_millis;

/// Backoff policy used by `refresh_with_retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,
    /// Upper bound for any delay.
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1 for the first retry).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * factor)
            .map_or(self.max_interval, |delay| delay.min(self.max_interval))
    }
}
