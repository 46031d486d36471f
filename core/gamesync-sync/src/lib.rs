//! Synchronization engine for GameSync.
//!
//! Keeps one authoritative game state consistent under concurrent writers.
//! Every write carries a per-path version; the engine commits writes in
//! strictly increasing version order and treats anything else as a
//! conflict, settled by a configurable policy or queued for an operator.
//!
//! # Components
//!
//! - **VersionVector**: per-path monotonic counters (stale-write detection)
//! - **Conflict**: resolution policies and the bounded manual queue
//! - **Applicator**: the seam that writes operations into the state tree
//! - **Queue**: priority lanes for the batched strategies
//! - **Metrics**: totals, rolling latency, throughput, recent operations
//! - **Engine**: orchestrates detect → resolve → apply → advance
//!
//! # Example
//!
//! ```
//! use gamesync_sync::{ResolutionPolicy, SyncConfig, SyncEngine, SyncStrategy};
//!
//! let config = SyncConfig {
//!     strategy: SyncStrategy::Batched,
//!     conflict_resolution: ResolutionPolicy::Merge,
//!     ..Default::default()
//! };
//!
//! let engine = SyncEngine::new(config);
//! assert_eq!(engine.strategy(), SyncStrategy::Batched);
//! ```

pub mod applicator;
pub mod config;
pub mod conflict;
mod engine;
mod error;
pub mod metrics;
pub mod observer;
pub mod queue;
mod result;
pub mod version_vector;

pub use applicator::{ApplicatorError, ApplicatorResult, PathApplicator, StateApplicator};
pub use config::{ConsistencyLevel, ResolutionPolicy, SyncConfig, SyncStrategy};
pub use conflict::{ConflictQueue, ConflictResolution, Resolved, SyncConflict};
pub use engine::{SyncEngine, FULL_STATE_SOURCE};
pub use error::{Result, SyncError};
pub use metrics::{OperationRecord, SyncMetrics, RECENT_CAPACITY, RECENT_TRIM_TO};
pub use observer::{NoopObserver, StateChange, SyncFailure, SyncObserver};
pub use result::SyncResult;
pub use version_vector::{VersionEntry, VersionVector};
