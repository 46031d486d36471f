//! Outcome of a sync call.

use crate::conflict::SyncConflict;
use gamesync_types::{OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// What happened to one operation.
///
/// `success:true, applied:false` is a deliberate "accepted but not applied"
/// outcome: the operation was queued, or a conflict kept the local value or
/// went to manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub operation_id: OperationId,
    pub timestamp: Timestamp,
    pub latency: Duration,
    pub conflicts: Vec<SyncConflict>,
    /// The state tree was mutated by this operation.
    pub applied: bool,
    /// The operation is waiting in the batch queue.
    pub queued: bool,
    /// Authoritative value at the path when the write did not land, so a
    /// speculative caller can revert to it.
    pub rollback: Option<Value>,
    pub error: Option<String>,
}

impl SyncResult {
    /// A result for an operation that was committed or settled.
    pub fn settled(operation_id: OperationId, latency: Duration, applied: bool) -> Self {
        Self {
            success: true,
            operation_id,
            timestamp: Timestamp::now(),
            latency,
            conflicts: Vec::new(),
            applied,
            queued: false,
            rollback: None,
            error: None,
        }
    }

    /// A result for an operation placed in the batch queue.
    pub fn queued(operation_id: OperationId) -> Self {
        Self {
            queued: true,
            ..Self::settled(operation_id, Duration::ZERO, false)
        }
    }

    /// A failed result.
    pub fn failed(operation_id: OperationId, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::settled(operation_id, latency, false)
        }
    }

    #[must_use]
    pub fn with_conflicts(mut self, conflicts: Vec<SyncConflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    #[must_use]
    pub fn with_rollback(mut self, rollback: Option<Value>) -> Self {
        self.rollback = rollback;
        self
    }

    /// Returns true if the operation landed in the state tree.
    #[must_use]
    pub fn committed(&self) -> bool {
        self.success && self.applied
    }
}
