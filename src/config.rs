//! Catch-up configuration (concurrency limits, batch sizes, timeouts).

use std::time::Duration;

/// Catch-up engine configuration.
///
/// Controls node-wide admission limits, streaming batch sizes, RPC timeouts,
/// and the snapshot retry throttle.
#[derive(Debug, Clone)]
pub struct CatchupConfig {
    /// Maximum concurrent log-based catch-ups across all partitions on this
    /// node.
    ///
    /// Log shipping is I/O heavy; unconstrained concurrency would starve
    /// steady-state replication traffic.
    ///
    /// Default: 5
    pub max_log_catchups: usize,

    /// Maximum concurrent snapshot-based catch-ups across all partitions.
    ///
    /// Snapshot generation and transfer are the most expensive operations
    /// the storage subsystem performs, so this gate is independent of the
    /// log gate.
    ///
    /// Default: 5
    pub max_snapshot_catchups: usize,

    /// Sleep interval between admission retries when a gate is full.
    ///
    /// Admission is a busy-poll, not a fair queue; waiters re-check the gate
    /// at this cadence.
    ///
    /// Default: 150ms
    pub admission_poll_interval: Duration,

    /// Maximum number of entries per AppendEntries batch.
    ///
    /// Default: 1000 entries
    pub max_batch_entries: usize,

    /// Maximum total payload bytes per AppendEntries batch.
    ///
    /// Applied in addition to the entry-count limit; whichever bound is hit
    /// first closes the batch.
    ///
    /// Default: 1 MiB
    pub max_batch_bytes: usize,

    /// Per-RPC timeout for AppendEntries requests during streaming.
    ///
    /// Default: 5s
    pub rpc_timeout: Duration,

    /// Timeout for transporting a snapshot to a follower.
    ///
    /// Snapshots can be very large; this bound is deliberately generous.
    ///
    /// Default: 20 minutes
    pub snapshot_transport_timeout: Duration,

    /// Minimum interval between snapshot catch-up attempts per follower.
    ///
    /// Protects storage from repeatedly materializing snapshots for a
    /// follower that is mid-transfer or retrying too fast.
    ///
    /// Default: 20s
    pub snapshot_min_interval: Duration,

    /// Whether AppendEntries requests carry the trim-index retention hint.
    ///
    /// Protocol version toggle; older followers do not understand the field.
    ///
    /// Default: false
    pub include_trim_index: bool,
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            max_log_catchups: 5,
            max_snapshot_catchups: 5,
            admission_poll_interval: Duration::from_millis(150),

            max_batch_entries: 1000,
            max_batch_bytes: 1024 * 1024, // 1 MiB

            rpc_timeout: Duration::from_secs(5),
            snapshot_transport_timeout: Duration::from_secs(20 * 60),
            snapshot_min_interval: Duration::from_secs(20),

            include_trim_index: false,
        }
    }
}

impl CatchupConfig {
    /// Validate configuration (ensure invariants hold).
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_log_catchups == 0 {
            return Err("max_log_catchups must be > 0".to_string());
        }

        if self.max_snapshot_catchups == 0 {
            return Err("max_snapshot_catchups must be > 0".to_string());
        }

        if self.admission_poll_interval.is_zero() {
            return Err("admission_poll_interval must be > 0".to_string());
        }

        if self.max_batch_entries == 0 {
            return Err("max_batch_entries must be > 0".to_string());
        }

        if self.max_batch_bytes == 0 {
            return Err("max_batch_bytes must be > 0".to_string());
        }

        if self.rpc_timeout.is_zero() {
            return Err("rpc_timeout must be > 0".to_string());
        }

        Ok(())
    }
}
