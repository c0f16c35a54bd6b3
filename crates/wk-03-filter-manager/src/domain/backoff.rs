//! Jittered exponential backoff for resubscribe attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failure. Zero disables backoff.
    pub base: Duration,
    /// Upper bound on the delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn disabled() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.base.is_zero()
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// `jitter` in `[0, 1)` scales the delay into `[delay / 2, delay)`.
    pub fn delay(&self, failures: u32, jitter: f64) -> Duration {
        if !self.is_enabled() || failures == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(16);
        let raw = self.base.saturating_mul(1u32 << exponent).min(self.max);
        raw.mul_f64(0.5 + jitter.clamp(0.0, 1.0) / 2.0)
    }
}
