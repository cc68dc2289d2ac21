//! Catch-up metrics: node-wide atomic counters and duration accumulators.
//!
//! Vendor-neutral by design; backends scrape `MetricsSnapshot` however they
//! like. One instance is shared across all partitions on the node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Node-wide catch-up counters.
#[derive(Default)]
pub struct CatchupMetrics {
    errors: AtomicU64,
    admission_waits: AtomicU64,
    snapshot_throttled: AtomicU64,
    log_catchups: AtomicU64,
    snapshot_catchups: AtomicU64,
    log_catchup_ms: AtomicU64,
    snapshot_catchup_ms: AtomicU64,
}

impl CatchupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catch-up attempt failed (any cause other than throttling).
    pub fn incr_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// An admission gate was full and a worker slept one poll interval.
    pub fn incr_admission_waits(&self) {
        self.admission_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// A snapshot attempt was aborted by the per-follower retry throttle.
    pub fn incr_snapshot_throttled(&self) {
        self.snapshot_throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// A log-based catch-up completed successfully.
    pub fn record_log_catchup(&self, elapsed: Duration) {
        self.log_catchups.fetch_add(1, Ordering::Relaxed);
        self.log_catchup_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// A snapshot-based catch-up completed successfully.
    pub fn record_snapshot_catchup(&self, elapsed: Duration) {
        self.snapshot_catchups.fetch_add(1, Ordering::Relaxed);
        self.snapshot_catchup_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            errors: self.errors.load(Ordering::Relaxed),
            admission_waits: self.admission_waits.load(Ordering::Relaxed),
            snapshot_throttled: self.snapshot_throttled.load(Ordering::Relaxed),
            log_catchups: self.log_catchups.load(Ordering::Relaxed),
            snapshot_catchups: self.snapshot_catchups.load(Ordering::Relaxed),
            log_catchup_ms: self.log_catchup_ms.load(Ordering::Relaxed),
            snapshot_catchup_ms: self.snapshot_catchup_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub errors: u64,
    pub admission_waits: u64,
    pub snapshot_throttled: u64,
    pub log_catchups: u64,
    pub snapshot_catchups: u64,
    pub log_catchup_ms: u64,
    pub snapshot_catchup_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = CatchupMetrics::new();
        metrics.incr_errors();
        metrics.incr_errors();
        metrics.incr_admission_waits();
        metrics.record_log_catchup(Duration::from_millis(25));

        let snap = metrics.snapshot();
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.admission_waits, 1);
        assert_eq!(snap.log_catchups, 1);
        assert_eq!(snap.log_catchup_ms, 25);
        assert_eq!(snap.snapshot_catchups, 0);
    }
}
