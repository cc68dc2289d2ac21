//! Follower progress table.
//!
//! One entry per follower, created lazily on the first catch-up request and
//! superseded (never removed) by later requests. The coordinator writes the
//! state field; the streaming engines write the work counters; external
//! observers (metrics, admin tooling) only read. All mutations are single-key
//! writes or atomic counter updates, so no cross-key locking is needed.

use crate::types::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Catch-up state of one follower.
///
/// A follower is "catching up" iff the state is `Queued` or `Sending`.
/// `Done` is a resting signal, not a terminal halt: it re-arms the follower
/// for the next catch-up request. Absence of an entry is equivalent to an
/// implicit idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    Queued,
    Sending,
    Done,
}

impl FollowerState {
    pub fn is_catching_up(self) -> bool {
        matches!(self, FollowerState::Queued | FollowerState::Sending)
    }

    fn as_u8(self) -> u8 {
        match self {
            FollowerState::Queued => 0,
            FollowerState::Sending => 1,
            FollowerState::Done => 2,
        }
    }

    fn from_u8(v: u8) -> FollowerState {
        match v {
            0 => FollowerState::Queued,
            1 => FollowerState::Sending,
            _ => FollowerState::Done,
        }
    }
}

/// Progress of one follower's catch-up.
///
/// `completed` is monotonically non-decreasing within an attempt; `total` and
/// `completed` are reset together when a new streaming phase starts.
pub struct FollowerProgress {
    state: AtomicU8,
    total: AtomicU64,
    completed: AtomicU64,
    completion_ts: AtomicU64,
}

impl FollowerProgress {
    fn new(state: FollowerState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
            total: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            completion_ts: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> FollowerState {
        FollowerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: FollowerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Atomically transition `Done -> Queued`. Returns false when the
    /// follower is already queued or sending, so exactly one of any number
    /// of concurrent callers claims the catch-up.
    pub fn try_queue(&self) -> bool {
        self.state
            .compare_exchange(
                FollowerState::Done.as_u8(),
                FollowerState::Queued.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Start a new unit-of-work estimate: sets `total` and resets
    /// `completed`.
    pub fn begin(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    pub fn add_completed(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn set_completion_ts(&self, unix_secs: u64) {
        self.completion_ts.store(unix_secs, Ordering::SeqCst);
    }

    /// Read the last snapshot-attempt timestamp and reset it to zero in one
    /// atomic step, closing the read-then-write window between rapid
    /// duplicate attempts.
    pub fn take_completion_ts(&self) -> u64 {
        self.completion_ts.swap(0, Ordering::SeqCst)
    }

    pub fn completion_ts(&self) -> u64 {
        self.completion_ts.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: self.state(),
            total: self.total(),
            completed: self.completed(),
            completion_ts: self.completion_ts(),
        }
    }
}

/// Point-in-time copy of a follower's progress, for external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub state: FollowerState,
    pub total: u64,
    pub completed: u64,
    pub completion_ts: u64,
}

/// Per-partition table of follower progress entries.
///
/// Owned by the partition's coordinator and shared with the streaming
/// engines and external readers.
#[derive(Default)]
pub struct ProgressTable {
    entries: RwLock<HashMap<NodeId, Arc<FollowerProgress>>>,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the follower's entry, creating it in the `Done` (idle) state if it
    /// does not exist yet.
    pub fn entry(&self, follower: &NodeId) -> Arc<FollowerProgress> {
        if let Some(entry) = self.entries.read().get(follower) {
            return entry.clone();
        }

        self.entries
            .write()
            .entry(follower.clone())
            .or_insert_with(|| Arc::new(FollowerProgress::new(FollowerState::Done)))
            .clone()
    }

    pub fn get(&self, follower: &NodeId) -> Option<Arc<FollowerProgress>> {
        self.entries.read().get(follower).cloned()
    }

    /// True iff the follower's state is `Queued` or `Sending`. A missing
    /// entry means idle.
    pub fn is_catching_up(&self, follower: &NodeId) -> bool {
        self.entries
            .read()
            .get(follower)
            .map(|e| e.state().is_catching_up())
            .unwrap_or(false)
    }

    pub fn snapshot(&self, follower: &NodeId) -> Option<ProgressSnapshot> {
        self.entries.read().get(follower).map(|e| e.snapshot())
    }

    /// Snapshot of all followers, for monitoring.
    pub fn snapshot_all(&self) -> HashMap<NodeId, ProgressSnapshot> {
        self.entries
            .read()
            .iter()
            .map(|(id, e)| (id.clone(), e.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_is_idle() {
        let table = ProgressTable::new();
        assert!(!table.is_catching_up(&NodeId::new("f1")));
        assert!(table.snapshot(&NodeId::new("f1")).is_none());
    }

    #[test]
    fn test_catching_up_iff_queued_or_sending() {
        let table = ProgressTable::new();
        let follower = NodeId::new("f1");
        let entry = table.entry(&follower);

        assert!(!table.is_catching_up(&follower));

        entry.set_state(FollowerState::Queued);
        assert!(table.is_catching_up(&follower));

        entry.set_state(FollowerState::Sending);
        assert!(table.is_catching_up(&follower));

        entry.set_state(FollowerState::Done);
        assert!(!table.is_catching_up(&follower));
    }

    #[test]
    fn test_entry_is_reused_not_replaced() {
        let table = ProgressTable::new();
        let follower = NodeId::new("f1");

        let first = table.entry(&follower);
        first.begin(10);
        first.add_completed(4);

        let second = table.entry(&follower);
        assert_eq!(second.completed(), 4);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_try_queue_claims_exactly_once() {
        let progress = FollowerProgress::new(FollowerState::Done);

        assert!(progress.try_queue());
        assert_eq!(progress.state(), FollowerState::Queued);

        // Already queued or sending: further claims lose.
        assert!(!progress.try_queue());
        progress.set_state(FollowerState::Sending);
        assert!(!progress.try_queue());

        // Done re-arms the follower for the next claim.
        progress.set_state(FollowerState::Done);
        assert!(progress.try_queue());
    }

    #[test]
    fn test_begin_resets_completed() {
        let progress = FollowerProgress::new(FollowerState::Done);
        progress.begin(10);
        progress.add_completed(7);
        assert_eq!(progress.completed(), 7);

        progress.begin(20);
        assert_eq!(progress.total(), 20);
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn test_take_completion_ts_resets() {
        let progress = FollowerProgress::new(FollowerState::Done);
        progress.set_completion_ts(12345);

        assert_eq!(progress.take_completion_ts(), 12345);
        assert_eq!(progress.completion_ts(), 0);
        assert_eq!(progress.take_completion_ts(), 0);
    }
}
