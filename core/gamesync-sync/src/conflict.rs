//! Conflict records, resolution policies and the manual-resolution queue.

use crate::config::ResolutionPolicy;
use gamesync_types::{ConflictId, StatePath, SyncOperation, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// How a conflict was (or will be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Settled by the configured policy.
    Auto,
    /// Settled by an operator.
    Manual,
    /// Waiting in the manual queue.
    Pending,
}

/// A detected write-ordering violation at one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: ConflictId,
    pub path: StatePath,
    /// Current authoritative value.
    pub local_value: Value,
    /// Incoming value.
    pub remote_value: Value,
    pub resolution: ConflictResolution,
    pub resolved_value: Option<Value>,
    pub reason: String,
    pub timestamp: Timestamp,
}

impl SyncConflict {
    /// Creates a pending conflict.
    pub fn new(path: StatePath, local_value: Value, remote_value: Value, reason: impl Into<String>) -> Self {
        Self {
            id: ConflictId::new(),
            path,
            local_value,
            remote_value,
            resolution: ConflictResolution::Pending,
            resolved_value: None,
            reason: reason.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Marks the conflict settled with `value`.
    pub fn settle(&mut self, resolution: ConflictResolution, value: Value) {
        self.resolution = resolution;
        self.resolved_value = Some(value);
    }
}

/// The outcome chosen by a resolution policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Keep the authoritative value; the incoming write is dropped.
    KeepLocal,
    /// Apply the incoming write as-is.
    TakeRemote,
    /// Write a merged value in place of both.
    Merged(Value),
}

/// Applies `policy` to a conflict.
///
/// Returns `None` when the policy defers to manual resolution.
pub fn resolve(
    policy: ResolutionPolicy,
    local: &Value,
    local_written: Option<Timestamp>,
    remote: &Value,
    remote_written: Timestamp,
) -> Option<Resolved> {
    match policy {
        ResolutionPolicy::ClientWins => Some(Resolved::KeepLocal),
        ResolutionPolicy::ServerWins => Some(Resolved::TakeRemote),
        ResolutionPolicy::TimestampWins => match local_written {
            Some(local_ts) if remote_written <= local_ts => Some(Resolved::KeepLocal),
            _ => Some(Resolved::TakeRemote),
        },
        ResolutionPolicy::Merge => match (local.as_object(), remote.as_object()) {
            (Some(local_obj), Some(remote_obj)) => {
                let mut merged = local_obj.clone();
                for (key, value) in remote_obj {
                    merged.insert(key.clone(), value.clone());
                }
                Some(Resolved::Merged(Value::Object(merged)))
            }
            _ => Some(Resolved::TakeRemote),
        },
        ResolutionPolicy::Manual => None,
    }
}

/// A manual conflict together with the write that caused it.
#[derive(Debug, Clone)]
pub struct PendingConflict {
    pub conflict: SyncConflict,
    pub operation: SyncOperation,
}

/// Bounded FIFO of conflicts awaiting manual resolution.
///
/// Entries older than the TTL are purged; when full, the oldest entry is
/// evicted to make room.
#[derive(Debug)]
pub struct ConflictQueue {
    entries: VecDeque<PendingConflict>,
    capacity: usize,
    ttl: Duration,
}

impl ConflictQueue {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Queues a conflict, purging expired entries and evicting if full.
    pub fn push(&mut self, pending: PendingConflict, now: Timestamp) {
        self.purge_expired(now);
        while self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                warn!(
                    "Manual conflict queue full; evicting conflict {} at {}",
                    evicted.conflict.id, evicted.conflict.path
                );
            }
        }
        self.entries.push_back(pending);
    }

    /// Drops entries older than the TTL. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let cutoff = now.saturating_sub(self.ttl);
        let before = self.entries.len();
        self.entries.retain(|p| p.conflict.timestamp >= cutoff);
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!("Purged {} expired manual conflicts", purged);
        }
        purged
    }

    /// Removes and returns the conflict with `id`.
    pub fn take(&mut self, id: ConflictId) -> Option<PendingConflict> {
        let pos = self.entries.iter().position(|p| p.conflict.id == id)?;
        self.entries.remove(pos)
    }

    /// Returns the queued conflicts, oldest first.
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        self.entries.iter().map(|p| p.conflict.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
