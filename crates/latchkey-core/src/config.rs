//! Lock manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::retry::RetryPolicy;

/// Lock manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Prefix separating lock keys of unrelated deployments in one store
    pub namespace: String,
    /// TTL used when the caller does not specify one
    pub default_ttl_ms: u64,
    /// Largest TTL a caller may request
    pub max_ttl_ms: u64,
    /// Acquire wait used when the caller does not specify one (0 = single attempt)
    pub default_wait_ms: u64,
    /// Clock-skew allowance added to `expires_at` before a record counts as stale.
    /// Small TTLs with a small grace make skewed clocks more likely to take
    /// over a lock that its holder still believes valid.
    pub takeover_grace_ms: u64,
    /// Release attempts when the store is unavailable
    pub release_attempts: u32,
    /// Auto-renewal fires every `ttl / renew_ratio`
    pub renew_ratio: u32,
    /// Backoff between acquire attempts
    pub retry: RetryPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace: crate::DEFAULT_NAMESPACE.to_string(),
            default_ttl_ms: 30000,
            max_ttl_ms: 3_600_000,
            default_wait_ms: 0,
            takeover_grace_ms: 0,
            release_attempts: 3,
            renew_ratio: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl LockConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_millis(self.max_ttl_ms)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn takeover_grace(&self) -> Duration {
        Duration::from_millis(self.takeover_grace_ms)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_takeover_grace(mut self, grace: Duration) -> Self {
        self.takeover_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Check invariants between fields
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(LockError::Config("namespace must not be empty".to_string()));
        }
        if self.default_ttl_ms == 0 {
            return Err(LockError::Config("default_ttl_ms must be positive".to_string()));
        }
        if self.max_ttl_ms < self.default_ttl_ms {
            return Err(LockError::Config(format!(
                "max_ttl_ms ({}) must not be less than default_ttl_ms ({})",
                self.max_ttl_ms, self.default_ttl_ms
            )));
        }
        if self.release_attempts == 0 {
            return Err(LockError::Config(
                "release_attempts must be at least 1".to_string(),
            ));
        }
        if self.renew_ratio < 2 {
            return Err(LockError::Config(
                "renew_ratio must be at least 2".to_string(),
            ));
        }
        self.retry.validate()
    }
}
