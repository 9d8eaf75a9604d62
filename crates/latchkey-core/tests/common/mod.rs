//! Shared fixtures for lock integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use latchkey_core::{
    Clock, LockConfig, LockManager, LockStore, ManualClock, MemoryStore, RetryPolicy, StoreError,
};

pub const START: i64 = 1_700_000_000_000;

/// Manager, store and clock sharing one simulated timeline
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self { clock, store }
    }

    /// A manager acting as one independent process
    pub fn manager(&self, config: LockConfig) -> LockManager {
        LockManager::new(self.store.clone(), config)
            .expect("valid config")
            .with_clock(self.clock.clone())
    }

    /// A manager whose wall clock is off by `offset_ms`
    pub fn skewed_manager(&self, config: LockConfig, offset_ms: i64) -> LockManager {
        let clock: Arc<dyn Clock> = Arc::new(latchkey_core::SkewedClock::new(
            self.clock.clone(),
            offset_ms,
        ));
        LockManager::new(self.store.clone(), config)
            .expect("valid config")
            .with_clock(clock)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

pub fn single_attempt() -> LockConfig {
    LockConfig::default().with_retry(RetryPolicy::no_retry())
}

/// Store wrapper that fails the next `n` calls with `Unavailable`, or
/// applies writes and then reports `Timeout` as if the reply was dropped
pub struct FaultyStore {
    inner: Arc<dyn LockStore>,
    failures: AtomicU32,
    dropped_replies: AtomicU32,
    calls: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn LockStore>) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(0),
            dropped_replies: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Apply the next `n` writes but answer them with `Timeout`
    pub fn drop_next_replies(&self, n: u32) {
        self.dropped_replies.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(StoreError::Unavailable("injected fault".to_string()))
        } else {
            Ok(())
        }
    }

    fn reply(&self, applied: Result<bool, StoreError>) -> Result<bool, StoreError> {
        let dropped = self
            .dropped_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped { Err(StoreError::Timeout) } else { applied }
    }
}

#[async_trait]
impl LockStore for FaultyStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.reply(self.inner.set_if_absent(key, value, ttl).await)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.reply(self.inner.compare_and_swap(key, expected, new, ttl).await)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.reply(self.inner.compare_and_delete(key, expected).await)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }
}
