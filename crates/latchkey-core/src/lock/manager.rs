//! Lock manager: acquire / renew / release / stale-lock takeover
//!
//! The store's single-key atomic primitives are the only serialization point.
//! The manager keeps no in-process lock state across resources; every
//! transition of a remote record is one `set_if_absent`, `compare_and_swap`
//! or `compare_and_delete` call, never a read followed by a blind write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::model::{LockRecord, LockStats, LockToken, OwnerToken, ReleaseOutcome};
use super::stats::LockStatsCollector;
use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::store::LockStore;

/// Distributed lock manager over a shared [`LockStore`]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
    stats: LockStatsCollector,
}

impl LockManager {
    /// Create a manager using the system clock
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            config,
            stats: LockStatsCollector::default(),
        })
    }

    /// Replace the clock used to stamp and judge lock records
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    /// Key under which `resource` is stored
    pub fn store_key(&self, resource: &str) -> String {
        format!("{}::{}", self.config.namespace, resource)
    }

    /// Make a single acquisition attempt
    pub async fn try_acquire(&self, resource: &str, ttl: Duration) -> Result<LockToken> {
        self.acquire(resource, ttl, Duration::ZERO).await
    }

    /// Acquire with the configured default TTL and wait
    pub async fn acquire_default(&self, resource: &str) -> Result<LockToken> {
        self.acquire(resource, self.config.default_ttl(), self.config.default_wait())
            .await
    }

    /// Acquire `resource` for `ttl`, retrying under contention until
    /// `deadline` elapses or the retry policy is exhausted.
    ///
    /// Dropping the returned future at any retry boundary leaves no state
    /// behind: nothing is written until an attempt succeeds.
    pub async fn acquire(
        &self,
        resource: &str,
        ttl: Duration,
        deadline: Duration,
    ) -> Result<LockToken> {
        self.validate(resource, ttl)?;

        let owner = OwnerToken::generate();
        let started = tokio::time::Instant::now();
        let mut retry = 0u32;

        loop {
            let err = match self.attempt(resource, &owner, ttl).await {
                Ok(token) => {
                    self.stats.record_acquired();
                    return Ok(token);
                }
                Err(err) => {
                    self.observe_failure(&err);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    err
                }
            };

            retry += 1;
            let elapsed = started.elapsed();
            if retry > self.config.retry.max_retries || elapsed >= deadline {
                return Err(err);
            }

            let pause = self.config.retry.delay_for(retry).min(deadline - elapsed);
            debug!(
                resource = %resource,
                retry,
                delay_ms = pause.as_millis() as u64,
                error = %err,
                "Lock attempt failed, backing off"
            );
            tokio::time::sleep(pause).await;
        }
    }

    /// Extend a held lock to expire `ttl` from now.
    ///
    /// Fails with [`LockError::Lost`] when the stored record no longer equals
    /// the one this token wrote; the caller's critical section is then no
    /// longer protected.
    pub async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<LockToken> {
        self.validate(token.resource(), ttl)?;

        let key = self.store_key(token.resource());
        let now = self.clock.now_millis();
        let record = LockRecord::new(
            token.owner_token().clone(),
            token.acquired_at(),
            now.saturating_add(ttl.as_millis() as i64),
        );
        let encoded = record.encode()?;

        match self
            .store
            .compare_and_swap(&key, token.encoded_record(), &encoded, self.store_ttl(ttl))
            .await
        {
            Ok(true) => {
                self.stats.record_renewed();
                debug!(
                    resource = %token.resource(),
                    owner = %token.owner_token(),
                    expires_at = record.expires_at,
                    "Lock renewed"
                );
                Ok(LockToken::new(token.resource(), &record, ttl, encoded))
            }
            Ok(false) => {
                self.stats.record_lost();
                warn!(
                    resource = %token.resource(),
                    owner = %token.owner_token(),
                    "Lock lost before renewal"
                );
                Err(LockError::lost(token.resource()))
            }
            Err(e) => {
                self.stats.record_store_error();
                Err(e.into())
            }
        }
    }

    /// Release a held lock.
    ///
    /// Only removes the record this token wrote. A record that is gone or
    /// owned by someone else makes this a no-op. Store failures are retried
    /// up to `release_attempts` times; after that the record is left to
    /// expire by its TTL.
    pub async fn release(&self, token: LockToken) -> ReleaseOutcome {
        let key = self.store_key(token.resource());
        let attempts = self.config.release_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .store
                .compare_and_delete(&key, token.encoded_record())
                .await
            {
                Ok(true) => {
                    self.stats.record_released();
                    debug!(
                        resource = %token.resource(),
                        owner = %token.owner_token(),
                        "Lock released"
                    );
                    return ReleaseOutcome::Released;
                }
                Ok(false) => {
                    self.stats.record_release_noop();
                    debug!(
                        resource = %token.resource(),
                        owner = %token.owner_token(),
                        "Lock already gone or owned by another token, release is a no-op"
                    );
                    return ReleaseOutcome::NotHeld;
                }
                Err(e) => {
                    self.stats.record_store_error();
                    warn!(
                        resource = %token.resource(),
                        attempt,
                        error = %e,
                        "Lock release failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        warn!(
            resource = %token.resource(),
            owner = %token.owner_token(),
            expires_at = token.expires_at(),
            "Lock release unconfirmed, record will expire by TTL"
        );
        ReleaseOutcome::Unconfirmed
    }

    /// Whether the stored record is still the one `token` wrote and unexpired
    pub async fn is_held(&self, token: &LockToken) -> Result<bool> {
        let key = self.store_key(token.resource());
        let current = self.store.get(&key).await.inspect_err(|_| {
            self.stats.record_store_error();
        })?;
        Ok(current.as_deref() == Some(token.encoded_record())
            && !token.is_expired(self.clock.now_millis()))
    }

    /// Read the current record for `resource`
    pub async fn inspect(&self, resource: &str) -> Result<Option<LockRecord>> {
        self.validate_resource(resource)?;
        let key = self.store_key(resource);
        let Some(raw) = self.store.get(&key).await.inspect_err(|_| {
            self.stats.record_store_error();
        })?
        else {
            return Ok(None);
        };

        let record = LockRecord::decode(&raw);
        if record.is_none() {
            warn!(resource = %resource, "Stored lock value is not a lock record");
        }
        Ok(record)
    }

    /// Unconditionally remove the record for `resource` (operator action)
    pub async fn force_release(&self, resource: &str) -> Result<bool> {
        self.validate_resource(resource)?;
        let key = self.store_key(resource);
        let removed = self.store.delete(&key).await.inspect_err(|_| {
            self.stats.record_store_error();
        })?;
        if removed {
            warn!(resource = %resource, "Lock force-released");
        }
        Ok(removed)
    }

    /// Run `f` while holding `resource`, releasing afterwards
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        ttl: Duration,
        deadline: Duration,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(LockToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire(resource, ttl, deadline).await?;
        let output = f(token.clone()).await;
        self.release(token).await;
        Ok(output)
    }

    /// One pass of: create if absent, else take over iff stale
    async fn attempt(&self, resource: &str, owner: &OwnerToken, ttl: Duration) -> Result<LockToken> {
        let key = self.store_key(resource);
        let store_ttl = self.store_ttl(ttl);

        let (record, encoded) = self.fresh_record(owner, ttl)?;
        if self.store.set_if_absent(&key, &encoded, store_ttl).await? {
            debug!(resource = %resource, owner = %owner, "Lock acquired");
            return Ok(LockToken::new(resource, &record, ttl, encoded));
        }

        let Some(observed) = self.store.get(&key).await? else {
            // The holder released or the record expired between the two calls
            let (record, encoded) = self.fresh_record(owner, ttl)?;
            if self.store.set_if_absent(&key, &encoded, store_ttl).await? {
                debug!(resource = %resource, owner = %owner, "Lock acquired");
                return Ok(LockToken::new(resource, &record, ttl, encoded));
            }
            return Err(LockError::contended(resource));
        };

        let grace_ms = self.config.takeover_grace_ms as i64;
        match LockRecord::decode(&observed) {
            // An earlier attempt of this call was applied but its reply was lost
            Some(current) if current.owner_token == *owner => {
                return self.adopt(resource, &key, &observed, owner, ttl).await;
            }
            Some(current) if !current.is_stale(self.clock.now_millis(), grace_ms) => {
                return Err(LockError::contended(resource));
            }
            Some(current) => {
                debug!(
                    resource = %resource,
                    previous_owner = %current.owner_token,
                    expired_at = current.expires_at,
                    "Lock record is stale, attempting takeover"
                );
            }
            None => {
                warn!(
                    resource = %resource,
                    "Malformed lock record, attempting takeover"
                );
            }
        }

        let (record, encoded) = self.fresh_record(owner, ttl)?;
        if self
            .store
            .compare_and_swap(&key, &observed, &encoded, store_ttl)
            .await?
        {
            self.stats.record_takeover();
            info!(resource = %resource, owner = %owner, "Took over stale lock");
            Ok(LockToken::new(resource, &record, ttl, encoded))
        } else {
            // Another acquirer won the swap, or the holder renewed
            Err(LockError::contended(resource))
        }
    }

    /// Claim a record this acquisition already wrote, refreshing its expiry
    async fn adopt(
        &self,
        resource: &str,
        key: &str,
        observed: &str,
        owner: &OwnerToken,
        ttl: Duration,
    ) -> Result<LockToken> {
        let (record, encoded) = self.fresh_record(owner, ttl)?;
        if self
            .store
            .compare_and_swap(key, observed, &encoded, self.store_ttl(ttl))
            .await?
        {
            info!(
                resource = %resource,
                owner = %owner,
                "Adopted lock record written by an unacknowledged attempt"
            );
            Ok(LockToken::new(resource, &record, ttl, encoded))
        } else {
            Err(LockError::contended(resource))
        }
    }

    fn fresh_record(&self, owner: &OwnerToken, ttl: Duration) -> Result<(LockRecord, String)> {
        let now = self.clock.now_millis();
        let record = LockRecord::new(
            owner.clone(),
            now,
            now.saturating_add(ttl.as_millis() as i64),
        );
        let encoded = record.encode()?;
        Ok((record, encoded))
    }

    /// Store-side expiry never fires before a competitor may take over
    fn store_ttl(&self, ttl: Duration) -> Duration {
        ttl + self.config.takeover_grace()
    }

    fn observe_failure(&self, err: &LockError) {
        match err {
            LockError::Contended { .. } => self.stats.record_contended(),
            LockError::StoreUnavailable(_) => self.stats.record_store_error(),
            _ => {}
        }
    }

    fn validate_resource(&self, resource: &str) -> Result<()> {
        if resource.is_empty() {
            return Err(LockError::InvalidArgument(
                "resource key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate(&self, resource: &str, ttl: Duration) -> Result<()> {
        self.validate_resource(resource)?;
        if ttl.as_millis() == 0 {
            return Err(LockError::InvalidArgument(
                "ttl must be at least 1ms".to_string(),
            ));
        }
        if ttl > self.config.max_ttl() {
            return Err(LockError::InvalidArgument(format!(
                "ttl {}ms exceeds max_ttl_ms {}",
                ttl.as_millis(),
                self.config.max_ttl_ms
            )));
        }
        Ok(())
    }
}
