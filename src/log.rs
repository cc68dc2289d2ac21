//! Log store abstraction consumed by the catch-up engine.
//!
//! The durable log is an external collaborator with a fixed contract: point
//! lookups, bounded batch reads, and term queries. The engine never writes to
//! the log. `InMemoryLogStore` is the reference implementation used by tests;
//! production deployments plug in their own store behind the trait.

use crate::error::Result;
use crate::types::{LogEntry, LogIndex, Term};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Read-only view of the replicated log.
///
/// Compaction may trim a prefix of the log at any time; all methods report
/// `None`/short reads for trimmed indexes rather than failing.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Get a log entry by index. Returns `None` if the index was never
    /// written or has been compacted away.
    async fn get(&self, index: LogIndex) -> Result<Option<LogEntry>>;

    /// Get up to `max_entries` consecutive entries starting at `from`
    /// (inclusive), additionally bounded by `max_bytes` of total payload.
    ///
    /// The first entry is always included even if it alone exceeds
    /// `max_bytes`, so progress is always possible. Returns an empty vec if
    /// `from` is not retained.
    async fn get_batch(
        &self,
        from: LogIndex,
        max_entries: usize,
        max_bytes: usize,
    ) -> Result<Vec<LogEntry>>;

    /// Get the term of the entry at `index`. Returns `None` if the entry is
    /// not retained.
    async fn term(&self, index: LogIndex) -> Result<Option<Term>>;
}

/// In-memory log store for tests and examples.
///
/// Supports appending entries and compacting a prefix to simulate log
/// trimming after snapshotting.
#[derive(Default)]
pub struct InMemoryLogStore {
    entries: RwLock<BTreeMap<LogIndex, LogEntry>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Indexes need not be contiguous for test setups, but
    /// batch reads stop at the first gap.
    pub fn append(&self, entry: LogEntry) {
        self.entries.write().insert(entry.index, entry);
    }

    /// Append `count` entries with the given term, starting at `start`.
    pub fn fill(&self, term: Term, start: LogIndex, count: u64) {
        let mut entries = self.entries.write();
        for i in 0..count {
            let index = LogIndex(start.as_u64() + i);
            entries.insert(index, LogEntry::new(term, index, bytes::Bytes::new()));
        }
    }

    /// Drop all entries with index < `up_to`, simulating compaction.
    pub fn compact(&self, up_to: LogIndex) {
        let mut entries = self.entries.write();
        *entries = entries.split_off(&up_to);
    }

    /// First retained index, or `None` if the log is empty.
    pub fn first_index(&self) -> Option<LogIndex> {
        self.entries.read().keys().next().copied()
    }

    /// Last retained index, or `LogIndex::ZERO` if the log is empty.
    pub fn last_index(&self) -> LogIndex {
        self.entries
            .read()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(LogIndex::ZERO)
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn get(&self, index: LogIndex) -> Result<Option<LogEntry>> {
        Ok(self.entries.read().get(&index).cloned())
    }

    async fn get_batch(
        &self,
        from: LogIndex,
        max_entries: usize,
        max_bytes: usize,
    ) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read();

        let mut batch = Vec::new();
        let mut bytes = 0usize;
        let mut expected = from;

        for (index, entry) in entries.range(from..) {
            // Stop at gaps so the batch stays consecutive.
            if *index != expected {
                break;
            }

            if batch.len() >= max_entries {
                break;
            }

            if !batch.is_empty() && bytes + entry.size_bytes() > max_bytes {
                break;
            }

            bytes += entry.size_bytes();
            batch.push(entry.clone());
            expected = expected.next();
        }

        Ok(batch)
    }

    async fn term(&self, index: LogIndex) -> Result<Option<Term>> {
        Ok(self.entries.read().get(&index).map(|e| e.term))
    }
}
