//! Snapshot transfer engine: full-state catch-up for compacted followers.
//!
//! Invoked when the follower's last index has already been trimmed out of the
//! log. Materializes a snapshot at the partition's applied position, ships it
//! to the follower, deletes the local artifact whether or not the transfer
//! succeeded, then hands off to log streaming so the follower also receives
//! entries committed after the snapshot was taken.

use crate::config::CatchupConfig;
use crate::error::{CatchupError, Result};
use crate::log::LogStore;
use crate::progress::{FollowerProgress, FollowerState};
use crate::storage::SnapshotStore;
use crate::stream::send_logs;
use crate::transport::CatchupTransport;
use crate::types::{LogIndex, NodeId, PartitionId, Term};
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_now_secs() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs(),
        Err(_) => {
            tracing::warn!("system clock is before the unix epoch, snapshot throttle disabled");
            0
        }
    }
}

/// Run one snapshot-based catch-up attempt for `follower`.
///
/// The per-follower throttle runs first: if the previous snapshot attempt
/// finished less than `snapshot_min_interval` ago, the attempt aborts with
/// `Throttled` before storage is contacted at all. The throttle check also
/// zeroes the stored timestamp as it reads it, so rapid duplicate attempts
/// cannot race the read against the write.
///
/// Whatever the outcome of the transfer itself, the attempt stamps a fresh
/// completion timestamp so the next attempt is throttled against it.
#[allow(clippy::too_many_arguments)]
pub async fn send_snapshot(
    follower: &NodeId,
    partition: PartitionId,
    leader_term: Term,
    leader_commit: LogIndex,
    leader_id: &NodeId,
    log: &dyn LogStore,
    transport: &dyn CatchupTransport,
    storage: &dyn SnapshotStore,
    config: &CatchupConfig,
    progress: &FollowerProgress,
) -> Result<()> {
    let last_attempt = progress.take_completion_ts();
    if last_attempt != 0 {
        let elapsed = unix_now_secs().saturating_sub(last_attempt);
        let min = config.snapshot_min_interval.as_secs();
        if elapsed < min {
            return Err(CatchupError::Throttled {
                remaining_secs: min - elapsed,
            });
        }
    }

    progress.set_state(FollowerState::Sending);

    let result = transfer_and_stream(
        follower,
        partition,
        leader_term,
        leader_commit,
        leader_id,
        log,
        transport,
        storage,
        config,
        progress,
    )
    .await;

    progress.set_completion_ts(unix_now_secs());

    result
}

#[allow(clippy::too_many_arguments)]
async fn transfer_and_stream(
    follower: &NodeId,
    partition: PartitionId,
    leader_term: Term,
    leader_commit: LogIndex,
    leader_id: &NodeId,
    log: &dyn LogStore,
    transport: &dyn CatchupTransport,
    storage: &dyn SnapshotStore,
    config: &CatchupConfig,
    progress: &FollowerProgress,
) -> Result<()> {
    let handle = storage.create_snapshot(partition).await?;

    tracing::info!(
        partition = %partition,
        follower = %follower,
        position = %handle.position,
        "transporting snapshot"
    );

    let transported = transport
        .transport_snapshot(
            follower,
            partition,
            handle.position,
            &handle.path,
            config.snapshot_transport_timeout,
        )
        .await;

    // The local artifact is deleted whether or not the transfer succeeded;
    // failure to delete is logged and does not fail the attempt.
    if let Err(e) = storage.delete_snapshot(partition, handle.id).await {
        tracing::warn!(
            partition = %partition,
            snapshot_id = handle.id,
            error = %e,
            "failed to delete local snapshot artifact"
        );
    }

    let transfer_id = transported?;
    tracing::debug!(follower = %follower, transfer_id, "snapshot transfer complete");

    // The follower now sits at the snapshot position; stream the tail of the
    // log committed since then.
    send_logs(
        follower,
        handle.position.index,
        Some(handle.position.term),
        leader_term,
        leader_commit,
        leader_id,
        log,
        transport,
        config,
        progress,
    )
    .await
}
