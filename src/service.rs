//! Node-wide catch-up service - wires everything together.
//!
//! One `CatchupService` per node. It owns the shared admission controller and
//! metrics, and routes requests to per-partition coordinators registered at
//! partition start. The surrounding leader logic calls `catchup` when a
//! heartbeat or append rejection reveals a lagging follower.

use crate::admission::AdmissionController;
use crate::config::CatchupConfig;
use crate::coordinator::{CatchupContext, CatchupCoordinator};
use crate::log::LogStore;
use crate::metrics::{CatchupMetrics, MetricsSnapshot};
use crate::storage::SnapshotStore;
use crate::transport::CatchupTransport;
use crate::types::{LogIndex, NodeId, PartitionId, Term};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Node-wide catch-up service.
pub struct CatchupService {
    config: CatchupConfig,
    admission: Arc<AdmissionController>,
    metrics: Arc<CatchupMetrics>,
    transport: Arc<dyn CatchupTransport>,
    storage: Arc<dyn SnapshotStore>,
    partitions: RwLock<HashMap<PartitionId, Arc<CatchupCoordinator>>>,
}

impl CatchupService {
    /// Create the service. The admission gates are sized from `config` and
    /// shared by every partition registered afterwards.
    pub fn new(
        config: CatchupConfig,
        transport: Arc<dyn CatchupTransport>,
        storage: Arc<dyn SnapshotStore>,
    ) -> Self {
        let metrics = Arc::new(CatchupMetrics::new());
        let admission = Arc::new(AdmissionController::new(&config, metrics.clone()));

        Self {
            config,
            admission,
            metrics,
            transport,
            storage,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a partition and spawn its coordinator worker.
    ///
    /// Replaces (and shuts down) any coordinator previously registered for
    /// the same partition.
    pub fn register_partition(
        &self,
        partition: PartitionId,
        local_id: NodeId,
        log: Arc<dyn LogStore>,
    ) -> Arc<CatchupCoordinator> {
        let coordinator = Arc::new(CatchupCoordinator::new(
            CatchupContext::new(partition, local_id, log),
            self.config.clone(),
            self.admission.clone(),
            self.transport.clone(),
            self.storage.clone(),
            self.metrics.clone(),
        ));

        if let Some(old) = self
            .partitions
            .write()
            .insert(partition, coordinator.clone())
        {
            old.shutdown();
        }

        coordinator
    }

    /// Fire-and-forget catch-up request. Unknown partitions are ignored.
    pub fn catchup(
        &self,
        partition: PartitionId,
        follower: NodeId,
        follower_last_index: LogIndex,
        leader_term: Term,
        leader_commit: LogIndex,
    ) {
        let coordinator = self.partitions.read().get(&partition).cloned();
        match coordinator {
            Some(coordinator) => {
                coordinator.catchup(follower, follower_last_index, leader_term, leader_commit)
            }
            None => {
                tracing::debug!(partition = %partition, "catch-up request for unregistered partition");
            }
        }
    }

    /// Synchronous query: is the follower catching up on this partition?
    /// Unknown partitions answer `false`.
    pub fn is_catching_up(&self, partition: PartitionId, follower: &NodeId) -> bool {
        self.partitions
            .read()
            .get(&partition)
            .map(|c| c.is_catching_up(follower))
            .unwrap_or(false)
    }

    /// The coordinator for a partition, for progress inspection.
    pub fn partition(&self, partition: PartitionId) -> Option<Arc<CatchupCoordinator>> {
        self.partitions.read().get(&partition).cloned()
    }

    /// Node-wide counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shut down every partition worker.
    pub fn shutdown(&self) {
        for coordinator in self.partitions.read().values() {
            coordinator.shutdown();
        }
    }
}
