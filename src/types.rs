//! Core catch-up types: terms, indexes, identifiers, RPC messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Raft term number (monotonically increasing).
///
/// Terms establish logical clocks in Raft. Catch-up carries the leader's
/// current term on every AppendEntries so the follower can detect stale
/// leaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(pub u64);

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn next(self) -> Term {
        Term(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Log index (1-indexed, 0 is sentinel for "no entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogIndex(pub u64);

impl LogIndex {
    pub const ZERO: LogIndex = LogIndex(0);

    pub fn next(self) -> LogIndex {
        LogIndex(self.0 + 1)
    }

    pub fn prev(self) -> Option<LogIndex> {
        if self.0 > 0 {
            Some(LogIndex(self.0 - 1))
        } else {
            None
        }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Number of entries between `self` (exclusive) and `to` (inclusive).
    /// Saturates at zero when `to` is not ahead of `self`.
    pub fn span_to(self, to: LogIndex) -> u64 {
        to.0.saturating_sub(self.0)
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Node identifier (unique across cluster).
///
/// NodeId is a string to support DNS names, UUIDs, or IP:port combinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replicated partition identifier.
///
/// Each partition runs its own replicated log and its own catch-up
/// coordinator. Admission control is shared across all partitions on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl PartitionId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Log entry (command + metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub index: LogIndex,
    pub command: Bytes,
}

impl LogEntry {
    pub fn new(term: Term, index: LogIndex, command: Bytes) -> Self {
        Self {
            term,
            index,
            command,
        }
    }

    /// Approximate wire size of this entry, used for batch byte budgeting.
    pub fn size_bytes(&self) -> usize {
        // term + index headers plus the payload
        16 + self.command.len()
    }
}

/// A position in the replicated log: index plus the term of the entry there.
///
/// Identifies the point a snapshot covers up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPosition {
    pub index: LogIndex,
    pub term: Term,
}

impl LogPosition {
    pub fn new(index: LogIndex, term: Term) -> Self {
        Self { index, term }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.term)
    }
}

/// Handle to a locally materialized snapshot artifact.
///
/// Returned by snapshot creation; the caller is responsible for deleting the
/// artifact once the transfer is over, whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    /// Storage-assigned snapshot id, used for deletion.
    pub id: u64,

    /// Log position the snapshot covers up to.
    pub position: LogPosition,

    /// Local filesystem path of the snapshot artifact.
    pub path: PathBuf,
}

/// AppendEntries RPC request, as sent during catch-up streaming.
///
/// Identical in shape to steady-state replication traffic; the follower does
/// not distinguish catch-up batches from normal appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    /// Leader's term.
    pub term: Term,

    /// Leader's ID.
    pub leader_id: NodeId,

    /// Index of log entry immediately preceding the batch.
    pub prev_log_index: LogIndex,

    /// Term of prev_log_index entry.
    pub prev_log_term: Term,

    /// Log entries to store.
    pub entries: Vec<LogEntry>,

    /// Leader's commit index.
    pub leader_commit: LogIndex,

    /// Retention hint: the follower may trim its log up to this index.
    /// Only populated when the protocol version toggle enables it.
    pub trim_index: Option<LogIndex>,
}

/// AppendEntries RPC response.
///
/// The follower echoes the prev index it matched against and reports its own
/// last log index. The reported index is authoritative: the streaming loop
/// resumes from it rather than from locally computed arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    /// Follower's current term.
    pub term: Term,

    /// Responding follower.
    pub follower_id: NodeId,

    /// Echo of the request's prev_log_index, for request/response pairing.
    pub prev_log_index: LogIndex,

    /// True if the follower matched prev_log_index/prev_log_term and stored
    /// the entries.
    pub success: bool,

    /// Follower's last log index after processing the request.
    pub last_log_index: LogIndex,
}
