//! Latchkey Core - distributed mutual exclusion over a shared key-value store
//!
//! This crate provides:
//! - Store client abstraction over single-key atomic primitives
//!   (set-if-absent, compare-and-swap, compare-and-delete)
//! - In-memory store for tests and single-process use
//! - Injectable clock source (system, manual, skewed)
//! - Lock records, owner tokens and caller-held lock tokens
//! - Lock manager: acquire / renew / release / stale-lock takeover
//! - Retry/backoff policy for contended acquisition
//! - Background auto-renewal (lock keeper)
//! - Lock statistics mirrored to the `metrics` facade

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod retry;
pub mod store;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SkewedClock, SystemClock};
pub use config::LockConfig;
pub use error::{LockError, Result, StoreError};
pub use lock::{
    KeeperState, LockKeeper, LockManager, LockRecord, LockStats, LockToken, OwnerToken,
    ReleaseOutcome,
};
pub use retry::RetryPolicy;
pub use store::{LockStore, MemoryStore};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "public";
