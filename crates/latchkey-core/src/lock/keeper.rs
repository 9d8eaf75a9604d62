//! Background auto-renewal for a held lock
//!
//! A [`LockKeeper`] renews its token every `ttl / renew_ratio` until stopped.
//! Loss of the lock is published on a watch channel so the critical section
//! can abort as soon as renewal reports [`LockError::Lost`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use super::manager::LockManager;
use super::model::{LockToken, ReleaseOutcome};
use crate::error::LockError;

/// Observable state of a kept lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeeperState {
    /// Still held; carries the latest renewed token
    Held(LockToken),
    /// Renewal found the record taken over or gone
    Lost,
    /// Renewal was stopped by the owner
    Stopped,
}

/// Keeps a lock alive in the background
pub struct LockKeeper {
    manager: Arc<LockManager>,
    state: watch::Receiver<KeeperState>,
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<Option<LockToken>>,
}

impl LockKeeper {
    /// Start renewing `token`
    pub fn spawn(manager: Arc<LockManager>, token: LockToken) -> Self {
        let ratio = manager.config().renew_ratio.max(2);
        let period = (token.ttl() / ratio).max(Duration::from_millis(1));

        let (state_tx, state) = watch::channel(KeeperState::Held(token.clone()));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(manager.clone(), token, period, state_tx, stop_rx));

        Self {
            manager,
            state,
            stop_tx,
            handle,
        }
    }

    pub fn state(&self) -> KeeperState {
        self.state.borrow().clone()
    }

    /// Latest token while the lock is still held
    pub fn token(&self) -> Option<LockToken> {
        match &*self.state.borrow() {
            KeeperState::Held(token) => Some(token.clone()),
            _ => None,
        }
    }

    /// Resolve once the keeper stops running; `true` if the lock was lost
    pub async fn lost(&self) -> bool {
        let mut state = self.state.clone();
        let lost = match state
            .wait_for(|s| !matches!(s, KeeperState::Held(_)))
            .await
        {
            Ok(s) => Some(*s == KeeperState::Lost),
            Err(_) => None,
        };
        // The renewal task ended without publishing a final state
        lost.unwrap_or_else(|| !matches!(*state.borrow(), KeeperState::Held(_)))
    }

    /// Stop renewing and hand back the latest token, if still held
    pub async fn stop(self) -> Option<LockToken> {
        let _ = self.stop_tx.send(()).await;
        match self.handle.await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Lock keeper task failed");
                None
            }
        }
    }

    /// Stop renewing and release the lock
    pub async fn release(self) -> ReleaseOutcome {
        let manager = self.manager.clone();
        match self.stop().await {
            Some(token) => manager.release(token).await,
            None => ReleaseOutcome::NotHeld,
        }
    }
}

async fn run(
    manager: Arc<LockManager>,
    mut token: LockToken,
    period: Duration,
    state_tx: watch::Sender<KeeperState>,
    mut stop_rx: mpsc::Receiver<()>,
) -> Option<LockToken> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match manager.renew(&token, token.ttl()).await {
                    Ok(renewed) => {
                        token = renewed;
                        let _ = state_tx.send(KeeperState::Held(token.clone()));
                    }
                    Err(LockError::Lost { .. }) => {
                        let _ = state_tx.send(KeeperState::Lost);
                        return None;
                    }
                    Err(e) => {
                        if token.is_expired(manager.clock().now_millis()) {
                            warn!(
                                resource = %token.resource(),
                                error = %e,
                                "Lock expired while renewal was failing"
                            );
                            let _ = state_tx.send(KeeperState::Lost);
                            return None;
                        }
                        warn!(
                            resource = %token.resource(),
                            error = %e,
                            "Lock renewal failed, retrying on next tick"
                        );
                    }
                }
            }
            _ = stop_rx.recv() => {
                debug!(resource = %token.resource(), "Lock keeper stopped");
                let _ = state_tx.send(KeeperState::Stopped);
                return Some(token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::LockConfig;
    use crate::retry::RetryPolicy;
    use crate::store::{LockStore, MemoryStore};

    const TTL: Duration = Duration::from_secs(3);

    fn setup() -> (Arc<LockManager>, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let config = LockConfig::default().with_retry(RetryPolicy::no_retry());
        let manager = LockManager::new(store.clone(), config)
            .unwrap()
            .with_clock(clock.clone());
        (Arc::new(manager), store, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeper_renews_periodically() {
        let (manager, _, clock) = setup();
        let token = manager.try_acquire("job-1", TTL).await.unwrap();
        let keeper = LockKeeper::spawn(manager.clone(), token);

        // Two renewal periods (1s each); the manual clock moves with them
        for _ in 0..2 {
            clock.advance(Duration::from_secs(1));
            tokio::time::sleep(Duration::from_millis(1_001)).await;
        }

        assert_eq!(manager.stats().renewals, 2);
        let latest = keeper.token().unwrap();
        assert_eq!(latest.expires_at(), clock.now_millis() + 3_000);
        assert!(manager.is_held(&latest).await.unwrap());

        assert_eq!(keeper.release().await, ReleaseOutcome::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeper_reports_loss() {
        let (manager, store, _) = setup();
        let token = manager.try_acquire("job-1", TTL).await.unwrap();
        let keeper = LockKeeper::spawn(manager.clone(), token);

        // Another party replaces the record
        store.delete("public::job-1").await.unwrap();
        let intruder = manager.try_acquire("job-1", TTL).await.unwrap();

        assert!(keeper.lost().await);
        assert_eq!(keeper.state(), KeeperState::Lost);
        assert_eq!(keeper.token(), None);
        assert_eq!(keeper.release().await, ReleaseOutcome::NotHeld);

        // The intruder's record is untouched
        assert!(manager.is_held(&intruder).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_latest_token() {
        let (manager, _, clock) = setup();
        let token = manager.try_acquire("job-1", TTL).await.unwrap();
        let keeper = LockKeeper::spawn(manager.clone(), token.clone());

        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let latest = keeper.stop().await.unwrap();

        assert_eq!(latest.owner_token(), token.owner_token());
        assert!(latest.expires_at() > token.expires_at());
        assert!(manager.is_held(&latest).await.unwrap());
        // The pre-renewal token was superseded
        assert_eq!(manager.release(token).await, ReleaseOutcome::NotHeld);
        assert_eq!(manager.release(latest).await, ReleaseOutcome::Released);
    }
}
