//! Retry/backoff policy for contended acquisition

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Spacing between `acquire` attempts under contention.
///
/// Delays double from `base_delay_ms` up to `max_delay_ms`. With `jitter`
/// enabled the delay is drawn uniformly from `[delay / 2, delay]` so that
/// competing acquirers do not retry in lockstep. Release never uses this
/// policy for its own attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_delay_ms: u64,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 50,
            max_delay_ms: 2000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculate the delay before retry number `retry` (1-indexed)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = (retry - 1).min(32);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);

        if !self.jitter || capped < 2 {
            return Duration::from_millis(capped);
        }

        let floor = capped / 2;
        let spread = ((capped - floor) as f64 * rand::random::<f64>()) as u64;
        Duration::from_millis(floor + spread)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(LockError::Config(format!(
                "retry.max_delay_ms ({}) must not be less than retry.base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}
