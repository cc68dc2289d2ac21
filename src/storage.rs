//! Snapshot storage abstraction.
//!
//! The storage engine materializes snapshots at the partition's current
//! applied position and deletes them once a transfer is over. The engine
//! behind this trait owns the byte-level snapshot format; catch-up only moves
//! the resulting artifact.

use crate::error::{CatchupError, Result};
use crate::types::{LogPosition, PartitionId, SnapshotHandle};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Snapshot-producing storage engine.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Materialize a snapshot of the partition at its current applied
    /// position. Returns a handle identifying the artifact and the log
    /// position it covers.
    async fn create_snapshot(&self, partition: PartitionId) -> Result<SnapshotHandle>;

    /// Delete a previously created snapshot artifact.
    async fn delete_snapshot(&self, partition: PartitionId, snapshot_id: u64) -> Result<()>;
}

/// In-memory snapshot store for tests.
///
/// Writes an empty marker file per snapshot under `dir` so that deletion is
/// observable, and tracks the partition's applied position explicitly.
pub struct InMemorySnapshotStore {
    dir: PathBuf,
    applied: RwLock<LogPosition>,
    live: RwLock<HashMap<u64, PathBuf>>,
    next_id: AtomicU64,
    created: AtomicU64,
    fail_create: AtomicBool,
}

impl InMemorySnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, applied: LogPosition) -> Self {
        Self {
            dir: dir.into(),
            applied: RwLock::new(applied),
            live: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Update the position snapshots will be taken at.
    pub fn set_applied(&self, position: LogPosition) {
        *self.applied.write() = position;
    }

    /// Make subsequent `create_snapshot` calls fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Total number of snapshots created so far.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of snapshot artifacts not yet deleted.
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn create_snapshot(&self, partition: PartitionId) -> Result<SnapshotHandle> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(CatchupError::SnapshotCreate {
                reason: "storage unavailable".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{}-snapshot-{}", partition, id));
        std::fs::write(&path, b"")?;

        self.live.write().insert(id, path.clone());
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(SnapshotHandle {
            id,
            position: *self.applied.read(),
            path,
        })
    }

    async fn delete_snapshot(&self, _partition: PartitionId, snapshot_id: u64) -> Result<()> {
        if let Some(path) = self.live.write().remove(&snapshot_id) {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogIndex, Term};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = InMemorySnapshotStore::new(
            dir.path(),
            LogPosition::new(LogIndex(100), Term(3)),
        );

        let handle = store.create_snapshot(PartitionId(1)).await.unwrap();
        assert_eq!(handle.position.index, LogIndex(100));
        assert!(handle.path.exists());
        assert_eq!(store.live_count(), 1);

        store.delete_snapshot(PartitionId(1), handle.id).await.unwrap();
        assert!(!handle.path.exists());
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_create_failure() {
        let dir = TempDir::new().unwrap();
        let store = InMemorySnapshotStore::new(
            dir.path(),
            LogPosition::new(LogIndex(1), Term(1)),
        );
        store.fail_create(true);

        let result = store.create_snapshot(PartitionId(1)).await;
        assert!(matches!(
            result,
            Err(CatchupError::SnapshotCreate { .. })
        ));
        assert_eq!(store.created_count(), 0);
    }
}
