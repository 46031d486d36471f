//! Optimistic update bookkeeping.

use gamesync_types::{PlayerId, SyncOperation, Timestamp, UpdateId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of an optimistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// A speculative change applied ahead of engine confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimisticUpdate {
    pub id: UpdateId,
    pub player_id: PlayerId,
    pub operation: SyncOperation,
    pub timestamp: Timestamp,
    pub status: UpdateStatus,
    /// Value at the operation's path before anything was attempted.
    pub rollback_data: Option<Value>,
    #[serde(skip)]
    pub registered_at: Instant,
}

impl OptimisticUpdate {
    pub fn new(player_id: PlayerId, operation: SyncOperation, rollback_data: Option<Value>) -> Self {
        Self {
            id: UpdateId::new(),
            player_id,
            operation,
            timestamp: Timestamp::now(),
            status: UpdateStatus::Pending,
            rollback_data,
            registered_at: Instant::now(),
        }
    }
}

/// Unsettled optimistic updates, bounded by capacity.
#[derive(Debug)]
pub struct PendingUpdates {
    updates: HashMap<UpdateId, (u64, OptimisticUpdate)>,
    next_seq: u64,
    capacity: usize,
}

impl PendingUpdates {
    pub fn new(capacity: usize) -> Self {
        Self {
            updates: HashMap::new(),
            next_seq: 0,
            capacity: capacity.max(1),
        }
    }

    /// Tracks an update. At capacity the oldest pending update is displaced
    /// and returned so the caller can reject it.
    pub fn insert(&mut self, update: OptimisticUpdate) -> Option<OptimisticUpdate> {
        let displaced = if self.updates.len() >= self.capacity {
            let oldest = self
                .updates
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(id, _)| *id);
            oldest.and_then(|id| self.take(id))
        } else {
            None
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.updates.insert(update.id, (seq, update));
        displaced
    }

    /// Removes and returns an update.
    pub fn take(&mut self, id: UpdateId) -> Option<OptimisticUpdate> {
        self.updates.remove(&id).map(|(_, update)| update)
    }

    /// Removes every update registered more than `ttl` before `now`,
    /// oldest first.
    pub fn take_expired(&mut self, now: Instant, ttl: Duration) -> Vec<OptimisticUpdate> {
        let mut expired: Vec<_> = self
            .updates
            .iter()
            .filter(|(_, (_, u))| now.saturating_duration_since(u.registered_at) > ttl)
            .map(|(id, (seq, _))| (*seq, *id))
            .collect();
        expired.sort_unstable();
        expired.into_iter().filter_map(|(_, id)| self.take(id)).collect()
    }

    pub fn get(&self, id: UpdateId) -> Option<&OptimisticUpdate> {
        self.updates.get(&id).map(|(_, update)| update)
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
