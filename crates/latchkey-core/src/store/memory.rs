// In-memory lock store
// Per-key atomicity comes from the DashMap shard lock held across each check-and-write

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::LockStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// A stored value and its store-side expiry
struct StoredValue {
    value: String,
    expires_at: i64,
}

impl StoredValue {
    fn new(value: &str, now: i64, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.saturating_add(ttl.as_millis() as i64),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// DashMap-backed store honoring TTLs against an injected clock
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose TTL expiry follows `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key` if its value has expired
    fn evict_expired(&self, key: &str, now: i64) {
        if self.entries.remove_if(key, |_, v| !v.is_live(now)).is_some() {
            debug!(key = %key, "Evicted expired store entry");
        }
    }

    /// Eagerly drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(count = purged, "Purged expired store entries");
        }
        purged
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    return Ok(false);
                }
                entry.insert(StoredValue::new(value, now, ttl));
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(value, now, ttl));
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        self.evict_expired(key, now);
        let Some(mut current) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if !current.is_live(now) || current.value != expected {
            return Ok(false);
        }
        *current = StoredValue::new(new, now, ttl);
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        self.evict_expired(key, now);
        Ok(self
            .entries
            .remove_if(key, |_, v| v.is_live(now) && v.value == expected)
            .is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        self.evict_expired(key, now);
        Ok(self
            .entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| v.is_live(now)))
    }
}
