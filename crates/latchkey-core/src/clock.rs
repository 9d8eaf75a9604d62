//! Clock sources
//!
//! Staleness of a lock record is judged by comparing the stored `expires_at`
//! against `Clock::now_millis`. Tests inject [`ManualClock`] to simulate
//! expiry without sleeping, and [`SkewedClock`] to model processes whose
//! wall clocks disagree.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time source in Unix milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A clock that reads another clock shifted by a fixed offset
pub struct SkewedClock {
    inner: Arc<dyn Clock>,
    offset_ms: i64,
}

impl SkewedClock {
    /// `offset_ms` may be negative (clock running behind)
    pub fn new(inner: Arc<dyn Clock>, offset_ms: i64) -> Self {
        Self { inner, offset_ms }
    }
}

impl Clock for SkewedClock {
    fn now_millis(&self) -> i64 {
        self.inner.now_millis().saturating_add(self.offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_epoch() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(Duration::from_secs(6));
        assert_eq!(clock.now_millis(), 7_000);

        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }

    #[test]
    fn test_skewed_clock_follows_inner() {
        let base = Arc::new(ManualClock::new(10_000));
        let ahead = SkewedClock::new(base.clone(), 2_500);
        let behind = SkewedClock::new(base.clone(), -2_500);

        assert_eq!(ahead.now_millis(), 12_500);
        assert_eq!(behind.now_millis(), 7_500);

        base.advance(Duration::from_millis(500));
        assert_eq!(ahead.now_millis(), 13_000);
        assert_eq!(behind.now_millis(), 8_000);
    }
}
