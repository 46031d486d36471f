//! Typed notifications emitted by the engine.

use crate::conflict::SyncConflict;
use crate::metrics::SyncMetrics;
use gamesync_types::{OperationId, StatePath, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A committed change to the authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub operation_id: OperationId,
    pub path: StatePath,
    /// Value now stored at `path` (`None` after a delete).
    pub value: Option<Value>,
    /// Value stored before the commit.
    pub previous: Option<Value>,
    pub version: u64,
    pub source: String,
    pub timestamp: Timestamp,
}

/// A failed commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub operation_id: OperationId,
    pub path: String,
    pub error: String,
    pub timestamp: Timestamp,
}

/// Receives engine notifications.
///
/// Callbacks run after the engine has released its locks, on whichever task
/// settled the operation. Implementations must not block.
pub trait SyncObserver: Send + Sync {
    fn on_state_changed(&self, change: &StateChange) {
        let _ = change;
    }

    fn on_conflict(&self, conflict: &SyncConflict) {
        let _ = conflict;
    }

    fn on_sync_error(&self, failure: &SyncFailure) {
        let _ = failure;
    }

    fn on_metrics_updated(&self, metrics: &SyncMetrics) {
        let _ = metrics;
    }
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
