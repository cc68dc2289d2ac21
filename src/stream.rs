//! Log streaming engine: incremental catch-up via AppendEntries batches.
//!
//! Streams entries from the leader's log store to a follower until the
//! follower's acknowledged index reaches the leader's commit index. The
//! follower is authoritative over its own cursor: each batch resumes from the
//! last index the follower reported, never from local arithmetic, so a slow
//! follower cannot be over-driven.

use crate::config::CatchupConfig;
use crate::error::{CatchupError, Result};
use crate::log::LogStore;
use crate::progress::{FollowerProgress, FollowerState};
use crate::transport::CatchupTransport;
use crate::types::{AppendEntriesRequest, LogIndex, NodeId, Term};
use tokio::time::timeout;

/// True iff `index > 0` and the log store still retains an entry there
/// (it has not been compacted away).
pub async fn has_log(log: &dyn LogStore, index: LogIndex) -> Result<bool> {
    if index == LogIndex::ZERO {
        return Ok(false);
    }
    Ok(log.get(index).await?.is_some())
}

/// Stream log entries to `follower`, starting after `start_exclusive`, until
/// its acknowledged index reaches `leader_commit`.
///
/// `start_term` carries the term at `start_exclusive` when the caller already
/// knows it (the snapshot handoff does; the entry may no longer be in the
/// log). Otherwise the term is read from the log store.
///
/// No internal retry: a timeout, transport failure, or a disagreeing
/// response surfaces to the caller. Retry happens at a higher level when the
/// next heartbeat or append rejection triggers a fresh catch-up request.
#[allow(clippy::too_many_arguments)]
pub async fn send_logs(
    follower: &NodeId,
    start_exclusive: LogIndex,
    start_term: Option<Term>,
    leader_term: Term,
    leader_commit: LogIndex,
    leader_id: &NodeId,
    log: &dyn LogStore,
    transport: &dyn CatchupTransport,
    config: &CatchupConfig,
    progress: &FollowerProgress,
) -> Result<()> {
    progress.set_state(FollowerState::Sending);
    progress.begin(start_exclusive.span_to(leader_commit));

    let mut next = start_exclusive;

    while next < leader_commit {
        let limit = (config.max_batch_entries as u64)
            .min(next.span_to(leader_commit)) as usize;

        let prev_index = next;
        let prev_term = match start_term {
            _ if prev_index == LogIndex::ZERO => Term::ZERO,
            Some(term) if prev_index == start_exclusive => term,
            _ => log
                .term(prev_index)
                .await?
                .ok_or(CatchupError::EntryMissing { index: prev_index })?,
        };

        let entries = log
            .get_batch(prev_index.next(), limit, config.max_batch_bytes)
            .await?;
        if entries.is_empty() {
            // The range below the commit index should be retained; a hole
            // means the log was trimmed underneath us.
            return Err(CatchupError::EntryMissing {
                index: prev_index.next(),
            });
        }

        let batch_len = entries.len();
        let request = AppendEntriesRequest {
            term: leader_term,
            leader_id: leader_id.clone(),
            prev_log_index: prev_index,
            prev_log_term: prev_term,
            entries,
            leader_commit,
            trim_index: config.include_trim_index.then_some(leader_commit),
        };

        let response = match timeout(
            config.rpc_timeout,
            transport.append_entries(follower, request),
        )
        .await
        {
            Ok(response) => response?,
            Err(_) => {
                return Err(CatchupError::RpcTimeout {
                    follower: follower.clone(),
                    elapsed_ms: config.rpc_timeout.as_millis() as u64,
                })
            }
        };

        // The follower must agree and must have made progress; anything else
        // is a protocol error at this layer (divergence recovery is the
        // steady-state path's job).
        if !response.success
            || response.prev_log_index != prev_index
            || response.last_log_index <= prev_index
        {
            return Err(CatchupError::FollowerRejected {
                follower: follower.clone(),
                prev_index,
            });
        }

        let advanced = prev_index.span_to(response.last_log_index);
        progress.add_completed(advanced);

        tracing::trace!(
            follower = %follower,
            sent = batch_len,
            accepted = advanced,
            follower_last = %response.last_log_index,
            "batch acknowledged"
        );

        next = response.last_log_index;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::InMemoryLogStore;
    use crate::progress::ProgressTable;
    use crate::transport::InMemoryFollower;
    use std::sync::Arc;
    use std::time::Duration;

    fn small_config() -> CatchupConfig {
        CatchupConfig {
            max_batch_entries: 4,
            rpc_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn progress_for(table: &ProgressTable, id: &NodeId) -> Arc<crate::progress::FollowerProgress> {
        table.entry(id)
    }

    #[tokio::test]
    async fn test_has_log() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(10), 5);

        assert!(!has_log(&log, LogIndex::ZERO).await.unwrap());
        assert!(!has_log(&log, LogIndex(9)).await.unwrap());
        assert!(has_log(&log, LogIndex(12)).await.unwrap());
        assert!(!has_log(&log, LogIndex(15)).await.unwrap());
    }

    #[tokio::test]
    async fn test_streams_to_commit_index() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 20);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(10));
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        send_logs(
            &follower_id,
            LogIndex(10),
            None,
            Term(2),
            LogIndex(20),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(follower.last_index(), LogIndex(20));
        assert_eq!(progress.total(), 10);
        assert_eq!(progress.completed(), 10);
        // 10 entries at 4 per batch = 3 requests
        assert_eq!(follower.request_count(), 3);
    }

    #[tokio::test]
    async fn test_follower_reported_index_drives_the_loop() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 12);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(0));
        // Accepts fewer entries than each batch carries.
        follower.set_max_accept_per_request(2);
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        send_logs(
            &follower_id,
            LogIndex(0),
            None,
            Term(1),
            LogIndex(12),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(follower.last_index(), LogIndex(12));
        assert_eq!(progress.completed(), 12);

        // Each request must resume from the follower's reported index.
        let requests = follower.requests();
        assert_eq!(requests.len(), 6);
        for (i, request) in requests.iter().enumerate() {
            assert_eq!(request.prev_log_index, LogIndex(2 * i as u64));
        }
    }

    #[tokio::test]
    async fn test_rpc_timeout_surfaces() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 5);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(0));
        follower.set_response_delay(Some(Duration::from_millis(200)));
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        let result = send_logs(
            &follower_id,
            LogIndex(0),
            None,
            Term(1),
            LogIndex(5),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await;

        assert!(matches!(result, Err(CatchupError::RpcTimeout { .. })));
    }

    #[tokio::test]
    async fn test_rejection_surfaces() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 5);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(0));
        follower.reject_appends(true);
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        let result = send_logs(
            &follower_id,
            LogIndex(0),
            None,
            Term(1),
            LogIndex(5),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await;

        assert!(matches!(
            result,
            Err(CatchupError::FollowerRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_trimmed_log_surfaces_as_missing_entry() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 20);
        // Trim past the follower's position after classification would have
        // happened.
        log.compact(LogIndex(15));

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(5));
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        let result = send_logs(
            &follower_id,
            LogIndex(5),
            None,
            Term(1),
            LogIndex(20),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await;

        assert!(matches!(result, Err(CatchupError::EntryMissing { .. })));
    }

    #[tokio::test]
    async fn test_already_caught_up_is_a_noop() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 10);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(10));
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        send_logs(
            &follower_id,
            LogIndex(10),
            None,
            Term(1),
            LogIndex(10),
            &leader_id,
            &log,
            &follower,
            &small_config(),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(follower.request_count(), 0);
        assert_eq!(progress.total(), 0);
    }

    #[tokio::test]
    async fn test_trim_index_toggle() {
        let log = InMemoryLogStore::new();
        log.fill(Term(1), LogIndex(1), 3);

        let follower_id = NodeId::new("f1");
        let leader_id = NodeId::new("leader");
        let follower = InMemoryFollower::new(follower_id.clone(), LogIndex(0));
        let table = ProgressTable::new();
        let progress = progress_for(&table, &follower_id);

        let config = CatchupConfig {
            include_trim_index: true,
            ..small_config()
        };

        send_logs(
            &follower_id,
            LogIndex(0),
            None,
            Term(1),
            LogIndex(3),
            &leader_id,
            &log,
            &follower,
            &config,
            &progress,
        )
        .await
        .unwrap();

        let requests = follower.requests();
        assert!(!requests.is_empty());
        assert!(requests
            .iter()
            .all(|r| r.trim_index == Some(LogIndex(3))));
    }
}
