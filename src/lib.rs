//! raft-catchup: follower catch-up engine for Raft-style replication.
//!
//! The subsystem a leader uses to bring a lagging or newly-joined follower up
//! to date, either by streaming missing log entries or by transferring a full
//! state snapshot followed by incremental entries:
//! - Per-partition coordinator with single-worker serialization and
//!   best-effort request dedup
//! - Node-wide admission control for log and snapshot catch-up work
//! - Follower-driven flow control (the follower's acknowledged index drives
//!   the streaming loop)
//! - Snapshot retry throttling per follower
//! - Progress table readable by external monitoring
//!
//! Steady-state replication, leader election, log divergence recovery, and
//! the snapshot byte format live outside this crate, behind the `LogStore`,
//! `SnapshotStore`, and `CatchupTransport` traits.

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod log;
pub mod metrics;
pub mod progress;
pub mod service;
pub mod snapshot;
pub mod storage;
pub mod stream;
pub mod transport;
pub mod types;

pub use admission::{AdmissionClass, AdmissionController, AdmissionPermit};
pub use config::CatchupConfig;
pub use coordinator::{CatchupContext, CatchupCoordinator};
pub use error::{CatchupError, Result};
pub use log::LogStore;
pub use metrics::{CatchupMetrics, MetricsSnapshot};
pub use progress::{FollowerState, ProgressSnapshot};
pub use service::CatchupService;
pub use storage::SnapshotStore;
pub use transport::CatchupTransport;
pub use types::*;
