//! Catch-up error types.

use thiserror::Error;

use crate::types::{LogIndex, NodeId};

/// Catch-up errors.
///
/// Every failure inside one catch-up attempt propagates to the coordinator's
/// worker loop, where it is logged, counted, and converted into a `Done`
/// state transition. Nothing here escapes the worker.
#[derive(Error, Debug)]
pub enum CatchupError {
    /// The log store no longer retains an entry the stream needs.
    #[error("Log entry {index} is not retained")]
    EntryMissing { index: LogIndex },

    /// An AppendEntries RPC exceeded the configured request timeout.
    #[error("AppendEntries to {follower} timed out after {elapsed_ms}ms")]
    RpcTimeout { follower: NodeId, elapsed_ms: u64 },

    /// The follower answered, but disagreed with the batch or echoed fields
    /// that do not match the request. Divergence recovery is out of scope
    /// here, so this is terminal for the attempt.
    #[error("Follower {follower} rejected entries after {prev_index}")]
    FollowerRejected {
        follower: NodeId,
        prev_index: LogIndex,
    },

    /// Transport-level failure (connection refused, reset, payload error).
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// The storage engine failed to materialize a snapshot.
    #[error("Snapshot creation failed: {reason}")]
    SnapshotCreate { reason: String },

    /// The snapshot file transfer to the follower failed.
    #[error("Snapshot transport to {follower} failed: {reason}")]
    SnapshotTransport { follower: NodeId, reason: String },

    /// Deliberate early exit: the minimum interval between snapshot attempts
    /// for this follower has not elapsed yet. Not an error condition; the
    /// coordinator counts it separately and does not log it at error level.
    #[error("Snapshot attempt throttled ({remaining_secs}s until next attempt)")]
    Throttled { remaining_secs: u64 },

    /// I/O error (snapshot artifact handling, local storage).
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Catch-up result type.
pub type Result<T> = std::result::Result<T, CatchupError>;
