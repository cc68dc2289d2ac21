//! Transport abstraction for follower catch-up RPCs.
//!
//! Two concerns live behind this trait: the AppendEntries channel used to
//! stream log entries, and the point-to-point file transfer used to move
//! snapshot artifacts. Production implementations wrap the cluster's RPC
//! stack; `InMemoryFollower` simulates a single follower in-process for
//! tests.

use crate::error::{CatchupError, Result};
use crate::types::{
    AppendEntriesRequest, AppendEntriesResponse, LogIndex, LogPosition, NodeId, PartitionId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Transport used by the catch-up engine.
///
/// Implementations handle connection management, serialization, and network
/// failures. Timeouts for AppendEntries are enforced by the caller; the
/// snapshot transfer honors the timeout it is handed since transfers can run
/// for minutes.
#[async_trait]
pub trait CatchupTransport: Send + Sync {
    /// Send an AppendEntries RPC to a follower and await its response.
    async fn append_entries(
        &self,
        target: &NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;

    /// Transfer a snapshot artifact to a follower. Returns a transfer id
    /// assigned by the transport.
    async fn transport_snapshot(
        &self,
        target: &NodeId,
        partition: PartitionId,
        position: LogPosition,
        path: &Path,
        timeout: Duration,
    ) -> Result<u64>;
}

/// Record of one snapshot transfer received by `InMemoryFollower`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTransfer {
    pub partition: PartitionId,
    pub position: LogPosition,
    pub path: PathBuf,
}

/// In-memory follower for tests (local state, no network).
///
/// Behaves like a well-formed follower: accepts batches whose prev index it
/// already holds, applies them, and reports its new last index. Knobs allow
/// simulating slow responses, transport failures, and a follower that accepts
/// fewer entries per request than it was sent.
pub struct InMemoryFollower {
    follower_id: NodeId,

    /// Highest log index the follower holds (log contents are irrelevant to
    /// the leader-side engine, only the index matters).
    last_index: Mutex<LogIndex>,

    /// Every AppendEntries request received, in order.
    requests: Mutex<Vec<AppendEntriesRequest>>,

    /// Every snapshot transfer received, in order.
    transfers: Mutex<Vec<SnapshotTransfer>>,

    /// Delay before answering each AppendEntries request.
    response_delay: Mutex<Option<Duration>>,

    /// When set, AppendEntries fails at the transport level.
    fail_appends: AtomicBool,

    /// When set, AppendEntries answers with success = false.
    reject_appends: AtomicBool,

    /// When set, snapshot transfers fail.
    fail_transfers: AtomicBool,

    /// Accept at most this many entries per request (0 = unlimited).
    /// Simulates a follower lagging behind the sent batch.
    max_accept_per_request: AtomicUsize,

    next_transfer_id: AtomicU64,
}

impl InMemoryFollower {
    pub fn new(follower_id: NodeId, last_index: LogIndex) -> Self {
        Self {
            follower_id,
            last_index: Mutex::new(last_index),
            requests: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            response_delay: Mutex::new(None),
            fail_appends: AtomicBool::new(false),
            reject_appends: AtomicBool::new(false),
            fail_transfers: AtomicBool::new(false),
            max_accept_per_request: AtomicUsize::new(0),
            next_transfer_id: AtomicU64::new(1),
        }
    }

    pub fn last_index(&self) -> LogIndex {
        *self.last_index.lock()
    }

    pub fn requests(&self) -> Vec<AppendEntriesRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn transfers(&self) -> Vec<SnapshotTransfer> {
        self.transfers.lock().clone()
    }

    pub fn set_response_delay(&self, delay: Option<Duration>) {
        *self.response_delay.lock() = delay;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn reject_appends(&self, reject: bool) {
        self.reject_appends.store(reject, Ordering::SeqCst);
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn set_max_accept_per_request(&self, max: usize) {
        self.max_accept_per_request.store(max, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatchupTransport for InMemoryFollower {
    async fn append_entries(
        &self,
        _target: &NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let delay = *self.response_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(CatchupError::Transport {
                reason: "connection reset".to_string(),
            });
        }

        self.requests.lock().push(request.clone());

        let mut last = self.last_index.lock();

        if self.reject_appends.load(Ordering::SeqCst) || request.prev_log_index > *last {
            return Ok(AppendEntriesResponse {
                term: request.term,
                follower_id: self.follower_id.clone(),
                prev_log_index: request.prev_log_index,
                success: false,
                last_log_index: *last,
            });
        }

        let max_accept = self.max_accept_per_request.load(Ordering::SeqCst);
        let accepted = if max_accept > 0 {
            request.entries.iter().take(max_accept).collect::<Vec<_>>()
        } else {
            request.entries.iter().collect()
        };

        if let Some(entry) = accepted.last() {
            if entry.index > *last {
                *last = entry.index;
            }
        }

        Ok(AppendEntriesResponse {
            term: request.term,
            follower_id: self.follower_id.clone(),
            prev_log_index: request.prev_log_index,
            success: true,
            last_log_index: *last,
        })
    }

    async fn transport_snapshot(
        &self,
        _target: &NodeId,
        partition: PartitionId,
        position: LogPosition,
        path: &Path,
        _timeout: Duration,
    ) -> Result<u64> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(CatchupError::SnapshotTransport {
                follower: self.follower_id.clone(),
                reason: "stream aborted".to_string(),
            });
        }

        self.transfers.lock().push(SnapshotTransfer {
            partition,
            position,
            path: path.to_path_buf(),
        });

        // Installing the snapshot advances the follower to its position.
        let mut last = self.last_index.lock();
        if position.index > *last {
            *last = position.index;
        }

        Ok(self.next_transfer_id.fetch_add(1, Ordering::SeqCst))
    }
}
