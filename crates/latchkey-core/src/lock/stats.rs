// Lock statistics collector
// Counters are kept locally for snapshots and mirrored to the metrics facade

use std::sync::atomic::{AtomicU64, Ordering};

use super::model::LockStats;

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    acquisitions: AtomicU64,
    takeovers: AtomicU64,
    contended: AtomicU64,
    lost: AtomicU64,
    releases: AtomicU64,
    release_noops: AtomicU64,
    renewals: AtomicU64,
    store_errors: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn record_acquired(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_acquire_total", "outcome" => "acquired").increment(1);
    }

    pub(crate) fn record_takeover(&self) {
        self.takeovers.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_takeover_total").increment(1);
    }

    pub(crate) fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_acquire_total", "outcome" => "contended").increment(1);
    }

    pub(crate) fn record_renewed(&self) {
        self.renewals.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_renew_total", "outcome" => "renewed").increment(1);
    }

    pub(crate) fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_renew_total", "outcome" => "lost").increment(1);
    }

    pub(crate) fn record_released(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_release_total", "outcome" => "released").increment(1);
    }

    pub(crate) fn record_release_noop(&self) {
        self.release_noops.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_release_total", "outcome" => "not_held").increment(1);
    }

    pub(crate) fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("latchkey_store_errors_total").increment(1);
    }

    pub(crate) fn snapshot(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            takeovers: self.takeovers.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            release_noops: self.release_noops.load(Ordering::Relaxed),
            renewals: self.renewals.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}
