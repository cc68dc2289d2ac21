//! Node-wide admission control for catch-up work.
//!
//! Two independent best-effort counting gates, one for log catch-ups and one
//! for snapshot catch-ups, shared across every partition on the node. A full
//! gate is handled by busy-polling: sleep a fixed interval and retry. This is
//! not a fair wait-queue; no ordering guarantee exists among waiters.

use crate::config::CatchupConfig;
use crate::metrics::CatchupMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Resource class gated by the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionClass {
    Log,
    Snapshot,
}

struct Gate {
    active: AtomicUsize,
    max: usize,
}

impl Gate {
    fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Atomically claim a slot if one is free.
    fn try_enter(&self) -> bool {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < self.max {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Node-wide bounded-concurrency gates for catch-up workers.
pub struct AdmissionController {
    log_gate: Arc<Gate>,
    snapshot_gate: Arc<Gate>,
    poll_interval: Duration,
    metrics: Arc<CatchupMetrics>,
}

impl AdmissionController {
    /// Expects a validated config: a zero concurrency limit would turn
    /// `acquire` into an endless poll loop.
    pub fn new(config: &CatchupConfig, metrics: Arc<CatchupMetrics>) -> Self {
        debug_assert!(config.validate().is_ok(), "admission config not validated");
        Self {
            log_gate: Arc::new(Gate::new(config.max_log_catchups)),
            snapshot_gate: Arc::new(Gate::new(config.max_snapshot_catchups)),
            poll_interval: config.admission_poll_interval,
            metrics,
        }
    }

    fn gate(&self, class: AdmissionClass) -> &Arc<Gate> {
        match class {
            AdmissionClass::Log => &self.log_gate,
            AdmissionClass::Snapshot => &self.snapshot_gate,
        }
    }

    /// Acquire a slot for the given class, sleeping between retries while the
    /// gate is full. The returned permit releases the slot on drop, so the
    /// slot is returned even if the gated work fails or times out.
    pub async fn acquire(&self, class: AdmissionClass) -> AdmissionPermit {
        let gate = self.gate(class).clone();

        loop {
            if gate.try_enter() {
                return AdmissionPermit { gate };
            }

            self.metrics.incr_admission_waits();
            tracing::debug!(class = ?class, "admission gate full, waiting for a slot");
            sleep(self.poll_interval).await;
        }
    }

    /// Current number of active holders for a class.
    pub fn active(&self, class: AdmissionClass) -> usize {
        self.gate(class).active.load(Ordering::SeqCst)
    }
}

/// RAII admission slot. Dropping it releases the slot.
pub struct AdmissionPermit {
    gate: Arc<Gate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(max_log: usize, poll_ms: u64) -> AdmissionController {
        let config = CatchupConfig {
            max_log_catchups: max_log,
            admission_poll_interval: Duration::from_millis(poll_ms),
            ..Default::default()
        };
        AdmissionController::new(&config, Arc::new(CatchupMetrics::new()))
    }

    #[test]
    #[should_panic(expected = "admission config not validated")]
    fn test_zero_limit_config_is_rejected() {
        let config = CatchupConfig {
            max_log_catchups: 0,
            ..Default::default()
        };
        let _ = AdmissionController::new(&config, Arc::new(CatchupMetrics::new()));
    }

    #[tokio::test]
    async fn test_acquire_release() {
        let controller = controller(2, 5);

        let p1 = controller.acquire(AdmissionClass::Log).await;
        let p2 = controller.acquire(AdmissionClass::Log).await;
        assert_eq!(controller.active(AdmissionClass::Log), 2);

        drop(p1);
        assert_eq!(controller.active(AdmissionClass::Log), 1);
        drop(p2);
        assert_eq!(controller.active(AdmissionClass::Log), 0);
    }

    #[tokio::test]
    async fn test_classes_are_independent() {
        let controller = controller(1, 5);

        let _log = controller.acquire(AdmissionClass::Log).await;
        // The snapshot gate has its own budget; this must not block.
        let _snap = controller.acquire(AdmissionClass::Snapshot).await;

        assert_eq!(controller.active(AdmissionClass::Log), 1);
        assert_eq!(controller.active(AdmissionClass::Snapshot), 1);
    }

    #[tokio::test]
    async fn test_full_gate_blocks_until_release() {
        let controller = Arc::new(controller(1, 2));

        let permit = controller.acquire(AdmissionClass::Log).await;

        let contender = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _p = controller.acquire(AdmissionClass::Log).await;
            })
        };

        // Give the contender time to hit the full gate at least once.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_maximum_under_contention() {
        use std::sync::atomic::AtomicUsize;

        let max = 3;
        let controller = Arc::new(controller(max, 1));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let controller = controller.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = controller.acquire(AdmissionClass::Log).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= max);
        assert_eq!(controller.active(AdmissionClass::Log), 0);
    }

    #[tokio::test]
    async fn test_waiting_increments_counter() {
        let metrics = Arc::new(CatchupMetrics::new());
        let config = CatchupConfig {
            max_log_catchups: 1,
            admission_poll_interval: Duration::from_millis(2),
            ..Default::default()
        };
        let controller = Arc::new(AdmissionController::new(&config, metrics.clone()));

        let permit = controller.acquire(AdmissionClass::Log).await;
        let contender = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _p = controller.acquire(AdmissionClass::Log).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(permit);
        contender.await.unwrap();

        assert!(metrics.snapshot().admission_waits > 0);
    }
}
