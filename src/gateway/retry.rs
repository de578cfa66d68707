// src/gateway/retry.rs

use crate::error::ModelError;
use std::time::Duration;

/// Exponential backoff for transient model failures.
///
/// The delay before retry `n` (1-based) is `multiplier * 2^(n-1)` seconds,
/// clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1.5,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries locally.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let secs = (self.multiplier * exp)
            .max(self.min_delay.as_secs_f64())
            .min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Whether a failed `attempt` should be retried locally. Rotation supersedes
    /// local retries when `rotate_on_error` is set.
    pub fn should_retry(&self, error: &ModelError, attempt: u32, rotate_on_error: bool) -> bool {
        !rotate_on_error && error.is_transient() && attempt < self.max_attempts
    }
}
