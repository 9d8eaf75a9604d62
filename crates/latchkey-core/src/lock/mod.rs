//! Distributed lock implementation
//!
//! This module provides:
//! - Lock record / owner token / lock token model
//! - Lock manager (acquire, renew, release, stale-lock takeover)
//! - Background auto-renewal
//! - Lock statistics

mod keeper;
mod manager;
mod model;
mod stats;

pub use keeper::{KeeperState, LockKeeper};
pub use manager::LockManager;
pub use model::*;
