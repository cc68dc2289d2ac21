//! Per-partition catch-up coordinator.
//!
//! The coordinator is the single entry point for catch-up requests on one
//! partition. It deduplicates requests against the progress table, then
//! funnels the surviving work items through a single worker task that
//! processes them one at a time in arrival order. Concurrency across
//! followers comes only from the node-wide admission gates operating across
//! partitions, never from per-partition parallelism.
//!
//! The worker is a recovery boundary: every failure inside one catch-up
//! attempt is caught here, logged with a bounded rendering, counted, and
//! converted into a `Done` state transition. The partition's catch-up
//! capability survives an arbitrary number of individual follower failures.

use crate::admission::{AdmissionClass, AdmissionController};
use crate::config::CatchupConfig;
use crate::error::{CatchupError, Result};
use crate::log::LogStore;
use crate::metrics::CatchupMetrics;
use crate::progress::{FollowerProgress, FollowerState, ProgressSnapshot, ProgressTable};
use crate::snapshot::send_snapshot;
use crate::storage::SnapshotStore;
use crate::stream::{has_log, send_logs};
use crate::transport::CatchupTransport;
use crate::types::{LogIndex, NodeId, PartitionId, Term};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

/// Longest error rendering the worker will put in a log line.
const MAX_ERROR_RENDER: usize = 256;

/// Immutable per-partition context, created at partition start and passed by
/// reference into both streaming engines.
pub struct CatchupContext {
    /// The partition this coordinator serves.
    pub partition: PartitionId,

    /// Identity of the local node (the leader).
    pub local_id: NodeId,

    /// The partition's log store.
    pub log: Arc<dyn LogStore>,
}

impl CatchupContext {
    pub fn new(partition: PartitionId, local_id: NodeId, log: Arc<dyn LogStore>) -> Self {
        Self {
            partition,
            local_id,
            log,
        }
    }
}

/// One queued catch-up request.
#[derive(Debug, Clone)]
struct CatchupItem {
    follower: NodeId,
    follower_last_index: LogIndex,
    leader_term: Term,
    leader_commit: LogIndex,
}

/// Which engine served a completed attempt.
enum CatchupKind {
    Log,
    Snapshot,
}

/// Per-partition catch-up coordinator.
///
/// Owns the partition's progress table; the worker task lives until
/// `shutdown` or until the coordinator is dropped (the mailbox closes).
pub struct CatchupCoordinator {
    partition: PartitionId,
    progress: Arc<ProgressTable>,
    work_tx: mpsc::UnboundedSender<CatchupItem>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CatchupCoordinator {
    /// Create the coordinator and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        ctx: CatchupContext,
        config: CatchupConfig,
        admission: Arc<AdmissionController>,
        transport: Arc<dyn CatchupTransport>,
        storage: Arc<dyn SnapshotStore>,
        metrics: Arc<CatchupMetrics>,
    ) -> Self {
        let partition = ctx.partition;
        let progress = Arc::new(ProgressTable::new());
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = Worker {
            ctx,
            config,
            admission,
            transport,
            storage,
            metrics,
            progress: progress.clone(),
        };
        tokio::spawn(worker.run(work_rx, shutdown_rx));

        Self {
            partition,
            progress,
            work_tx,
            shutdown_tx,
        }
    }

    /// Request a catch-up for `follower`. Fire-and-forget: never blocks on
    /// completion, and is a silent no-op when the follower is already
    /// catching up.
    ///
    /// The `Done -> Queued` transition is a single compare-exchange, so any
    /// number of concurrent callers racing on the same follower produce
    /// exactly one queued item. An external `is_catching_up` reader can
    /// still observe a stale `Done` between the claim and completion; that
    /// only costs it one redundant no-op request here.
    pub fn catchup(
        &self,
        follower: NodeId,
        follower_last_index: LogIndex,
        leader_term: Term,
        leader_commit: LogIndex,
    ) {
        let progress = self.progress.entry(&follower);
        if !progress.try_queue() {
            tracing::trace!(
                partition = %self.partition,
                follower = %follower,
                "already catching up, ignoring request"
            );
            return;
        }

        let send = self.work_tx.send(CatchupItem {
            follower: follower.clone(),
            follower_last_index,
            leader_term,
            leader_commit,
        });
        if send.is_err() {
            // The worker is gone (shutdown). Release the claim so the
            // follower does not read as catching up forever.
            progress.set_state(FollowerState::Done);
            tracing::debug!(
                partition = %self.partition,
                follower = %follower,
                "worker stopped, dropping catch-up request"
            );
        }
    }

    /// True iff the follower's state is `Queued` or `Sending`.
    pub fn is_catching_up(&self, follower: &NodeId) -> bool {
        self.progress.is_catching_up(follower)
    }

    /// Current progress of one follower, for monitoring.
    pub fn progress(&self, follower: &NodeId) -> Option<ProgressSnapshot> {
        self.progress.snapshot(follower)
    }

    /// Progress of all followers, for monitoring.
    pub fn progress_all(&self) -> HashMap<NodeId, ProgressSnapshot> {
        self.progress.snapshot_all()
    }

    /// Stop the worker task. Queued items are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct Worker {
    ctx: CatchupContext,
    config: CatchupConfig,
    admission: Arc<AdmissionController>,
    transport: Arc<dyn CatchupTransport>,
    storage: Arc<dyn SnapshotStore>,
    metrics: Arc<CatchupMetrics>,
    progress: Arc<ProgressTable>,
}

impl Worker {
    async fn run(
        self,
        mut work_rx: mpsc::UnboundedReceiver<CatchupItem>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                item = work_rx.recv() => {
                    match item {
                        Some(item) => self.process(item).await,
                        None => {
                            tracing::debug!(partition = %self.ctx.partition, "mailbox closed, exiting catch-up worker");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!(partition = %self.ctx.partition, "catch-up worker shutting down");
                    break;
                }
            }
        }
    }

    async fn process(&self, item: CatchupItem) {
        tracing::info!(
            partition = %self.ctx.partition,
            follower = %item.follower,
            follower_last = %item.follower_last_index,
            commit = %item.leader_commit,
            "starting catch-up"
        );

        let progress = self.progress.entry(&item.follower);
        let started = Instant::now();

        match self.run_attempt(&item, &progress).await {
            Ok(CatchupKind::Log) => {
                self.metrics.record_log_catchup(started.elapsed());
                tracing::info!(
                    partition = %self.ctx.partition,
                    follower = %item.follower,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "log catch-up complete"
                );
            }
            Ok(CatchupKind::Snapshot) => {
                self.metrics.record_snapshot_catchup(started.elapsed());
                tracing::info!(
                    partition = %self.ctx.partition,
                    follower = %item.follower,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot catch-up complete"
                );
            }
            Err(CatchupError::Throttled { remaining_secs }) => {
                self.metrics.incr_snapshot_throttled();
                tracing::debug!(
                    partition = %self.ctx.partition,
                    follower = %item.follower,
                    remaining_secs,
                    "snapshot attempt throttled"
                );
            }
            Err(e) => {
                self.metrics.incr_errors();
                tracing::warn!(
                    partition = %self.ctx.partition,
                    follower = %item.follower,
                    error = %render_bounded(&e),
                    "catch-up failed"
                );
            }
        }

        // Always the final step, regardless of outcome: signals completion
        // and re-arms the follower for the next request.
        progress.set_state(FollowerState::Done);
    }

    async fn run_attempt(
        &self,
        item: &CatchupItem,
        progress: &FollowerProgress,
    ) -> Result<CatchupKind> {
        if has_log(self.ctx.log.as_ref(), item.follower_last_index).await? {
            let _permit = self.admission.acquire(AdmissionClass::Log).await;
            send_logs(
                &item.follower,
                item.follower_last_index,
                None,
                item.leader_term,
                item.leader_commit,
                &self.ctx.local_id,
                self.ctx.log.as_ref(),
                self.transport.as_ref(),
                &self.config,
                progress,
            )
            .await?;
            Ok(CatchupKind::Log)
        } else {
            let _permit = self.admission.acquire(AdmissionClass::Snapshot).await;
            send_snapshot(
                &item.follower,
                self.ctx.partition,
                item.leader_term,
                item.leader_commit,
                &self.ctx.local_id,
                self.ctx.log.as_ref(),
                self.transport.as_ref(),
                self.storage.as_ref(),
                &self.config,
                progress,
            )
            .await?;
            Ok(CatchupKind::Snapshot)
        }
    }
}

/// Render an error for logging, truncated to a bounded length so a deeply
/// nested failure cannot blow up the log.
fn render_bounded(e: &CatchupError) -> String {
    let rendered = e.to_string();
    if rendered.len() <= MAX_ERROR_RENDER {
        return rendered;
    }
    let mut out: String = rendered.chars().take(MAX_ERROR_RENDER).collect();
    out.push_str("..");
    out
}
