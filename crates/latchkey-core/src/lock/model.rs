//! Lock data model: remote record, owner token, caller-held token

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-local sequence mixed into every owner token
static TOKEN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Unique proof of one acquisition instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Generate a token never issued before: 122 random bits plus a
    /// monotonically increasing process-local counter.
    pub fn generate() -> Self {
        let seq = TOKEN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{:x}", Uuid::new_v4().simple(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value stored remotely under a lock key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Owner of the current acquisition
    pub owner_token: OwnerToken,
    /// Acquisition timestamp (Unix millis)
    pub acquired_at: i64,
    /// Expiration timestamp (Unix millis)
    pub expires_at: i64,
}

impl LockRecord {
    pub fn new(owner_token: OwnerToken, acquired_at: i64, expires_at: i64) -> Self {
        Self {
            owner_token,
            acquired_at,
            expires_at,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored value; `None` when it is not a lock record
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// A record is abandoned once `now` reaches `expires_at + grace_ms`
    pub fn is_stale(&self, now: i64, grace_ms: i64) -> bool {
        now >= self.expires_at.saturating_add(grace_ms)
    }

    /// Time left before expiry
    pub fn remaining(&self, now: i64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now).max(0) as u64)
    }
}

/// Ownership proof held by the caller after a successful acquire.
///
/// The token remembers the exact record value it wrote; renew and release
/// only ever compare against that value, so a token can never touch a record
/// written by a different acquisition. Cloning a token is allowed (a clone
/// models a stale copy kept by a crashed holder) and is safe for the same
/// reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    resource: String,
    owner_token: OwnerToken,
    acquired_at: i64,
    expires_at: i64,
    ttl_ms: u64,
    record: String,
}

impl LockToken {
    pub(crate) fn new(resource: &str, record: &LockRecord, ttl: Duration, encoded: String) -> Self {
        Self {
            resource: resource.to_string(),
            owner_token: record.owner_token.clone(),
            acquired_at: record.acquired_at,
            expires_at: record.expires_at,
            ttl_ms: ttl.as_millis() as u64,
            record: encoded,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner_token(&self) -> &OwnerToken {
        &self.owner_token
    }

    pub fn acquired_at(&self) -> i64 {
        self.acquired_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// The exact stored value this token last wrote
    pub(crate) fn encoded_record(&self) -> &str {
        &self.record
    }

    pub fn remaining(&self, now: i64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now).max(0) as u64)
    }

    /// Expired by the caller's clock; the remote record may still exist
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Result of a release call. Release never fails: the caller no longer
/// holds the lock in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The caller's record was removed
    Released,
    /// Nothing to do: the record was gone or owned by someone else
    NotHeld,
    /// The store stayed unreachable; the record will expire by TTL
    Unconfirmed,
}

impl fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseOutcome::Released => "released",
            ReleaseOutcome::NotHeld => "not_held",
            ReleaseOutcome::Unconfirmed => "unconfirmed",
        };
        f.write_str(s)
    }
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Successful acquisitions (including takeovers)
    pub acquisitions: u64,
    /// Acquisitions that replaced a stale record
    pub takeovers: u64,
    /// Attempts that found the lock held
    pub contended: u64,
    /// Renewals that found the record taken over or gone
    pub lost: u64,
    /// Releases that removed the caller's record
    pub releases: u64,
    /// Releases that were no-ops
    pub release_noops: u64,
    /// Successful renewals
    pub renewals: u64,
    /// Store failures observed on any path
    pub store_errors: u64,
}
