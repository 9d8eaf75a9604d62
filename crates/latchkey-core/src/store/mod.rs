//! Store client abstraction
//!
//! The lock protocol needs only a handful of single-key atomic operations
//! from the shared store. Every mutation the lock manager performs goes
//! through one of these calls; it never pairs a read with a later write.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Single-key atomic primitives of the shared key-value store
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key = value` with an auto-expiry of `ttl` iff the key is absent.
    ///
    /// Returns `false` without mutating anything when a value already exists.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Replace the value with `new` (refreshing expiry to `ttl`) iff the
    /// current value equals `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove the key iff the current value equals `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Read the current value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally remove the key; `true` iff a value was present
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
