//! Retry policy shared by the transport, operation polling and the apply loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default first backoff in milliseconds.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Default backoff ceiling in milliseconds.
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// A policy with a fixed delay between attempts.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            initial_backoff_ms: ms,
            max_backoff_ms: ms,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = (self.initial_backoff_ms as f64) * self.multiplier.max(1.0).powi(exponent);
        let capped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Returns true if another attempt is allowed after `attempt` (1-based).
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
