//! Debounced broadcast queue and fan-out.

use gamesync_types::{PlayerId, Timestamp, UpdateId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// What an outgoing event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    StateChanged,
    Rollback,
    BulkUpdate,
    PlayerAction,
}

/// An event queued for delivery to the other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub id: UpdateId,
    pub kind: BroadcastKind,
    /// The player whose action produced the event. Never echoed back to them.
    pub player_id: PlayerId,
    pub payload: Value,
    pub timestamp: Timestamp,
}

impl BroadcastEvent {
    pub fn new(kind: BroadcastKind, player_id: PlayerId, payload: Value) -> Self {
        Self {
            id: UpdateId::new(),
            kind,
            player_id,
            payload,
            timestamp: Timestamp::now(),
        }
    }
}

/// Outgoing events awaiting the next debounced flush.
#[derive(Debug, Default)]
pub struct BroadcastQueue {
    events: VecDeque<BroadcastEvent>,
    flush_scheduled: bool,
}

impl BroadcastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event. Returns true if the caller must schedule a flush.
    pub fn push(&mut self, event: BroadcastEvent) -> bool {
        self.events.push_back(event);
        !std::mem::replace(&mut self.flush_scheduled, true)
    }

    /// Takes up to `max` events in arrival order.
    ///
    /// The second value is true when events remain, in which case a flush
    /// stays scheduled and the caller must arm another one.
    pub fn take_batch(&mut self, max: usize) -> (Vec<BroadcastEvent>, bool) {
        let n = max.max(1).min(self.events.len());
        let batch: Vec<_> = self.events.drain(..n).collect();
        let more = !self.events.is_empty();
        self.flush_scheduled = more;
        (batch, more)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Splits a batch into per-recipient deliveries, dropping each recipient's
/// own events. Recipients left with nothing to receive are skipped.
pub fn fan_out(batch: &[BroadcastEvent], recipients: &[PlayerId]) -> Vec<(PlayerId, Vec<BroadcastEvent>)> {
    recipients
        .iter()
        .filter_map(|player| {
            let events: Vec<_> = batch
                .iter()
                .filter(|e| &e.player_id != player)
                .cloned()
                .collect();
            (!events.is_empty()).then(|| (player.clone(), events))
        })
        .collect()
}
