//! Typed session notifications.

use crate::broadcast::BroadcastEvent;
use crate::connection::{ConnectionInfo, DisconnectReason};
use crate::optimistic::OptimisticUpdate;
use gamesync_types::{PlayerId, Timestamp};
use serde::Serialize;
use tokio::sync::mpsc;

/// Counters announced on every health tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatStats {
    pub active_connections: usize,
    pub reconnecting: usize,
    pub pending_updates: usize,
    pub timestamp: Timestamp,
}

/// Receives session notifications.
///
/// Callbacks run on the task that produced the event, after the session has
/// released its locks.
pub trait SessionObserver: Send + Sync {
    /// A speculative change was accepted locally.
    fn on_optimistic_update(&self, update: &OptimisticUpdate) {
        let _ = update;
    }

    fn on_optimistic_confirmed(&self, update: &OptimisticUpdate) {
        let _ = update;
    }

    /// The engine did not apply the change; `update.rollback_data` is the
    /// value to restore.
    fn on_optimistic_rejected(&self, update: &OptimisticUpdate, reason: &str) {
        let _ = (update, reason);
    }

    /// A debounced batch for one recipient.
    fn on_broadcast(&self, player: &PlayerId, events: &[BroadcastEvent]) {
        let _ = (player, events);
    }

    fn on_player_connected(&self, connection: &ConnectionInfo) {
        let _ = connection;
    }

    fn on_player_disconnected(&self, connection: &ConnectionInfo, reason: DisconnectReason) {
        let _ = (connection, reason);
    }

    fn on_player_reconnecting(&self, connection: &ConnectionInfo) {
        let _ = connection;
    }

    fn on_heartbeat(&self, stats: &HeartbeatStats) {
        let _ = stats;
    }

    fn on_sync_error(&self, player: Option<&PlayerId>, error: &str) {
        let _ = (player, error);
    }
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionObserver;

impl SessionObserver for NoopSessionObserver {}

/// Session notifications as values.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    OptimisticUpdate(OptimisticUpdate),
    OptimisticUpdateConfirmed(OptimisticUpdate),
    OptimisticUpdateRejected {
        update: OptimisticUpdate,
        reason: String,
    },
    BroadcastToPlayer {
        player_id: PlayerId,
        events: Vec<BroadcastEvent>,
    },
    PlayerConnected(ConnectionInfo),
    PlayerDisconnected {
        connection: ConnectionInfo,
        reason: DisconnectReason,
    },
    PlayerReconnecting(ConnectionInfo),
    Heartbeat(HeartbeatStats),
    SyncError {
        player_id: Option<PlayerId>,
        error: String,
    },
}

/// Forwards every notification into an unbounded channel.
///
/// Sends never block; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_optimistic_update(&self, update: &OptimisticUpdate) {
        self.send(SessionEvent::OptimisticUpdate(update.clone()));
    }

    fn on_optimistic_confirmed(&self, update: &OptimisticUpdate) {
        self.send(SessionEvent::OptimisticUpdateConfirmed(update.clone()));
    }

    fn on_optimistic_rejected(&self, update: &OptimisticUpdate, reason: &str) {
        self.send(SessionEvent::OptimisticUpdateRejected {
            update: update.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_broadcast(&self, player: &PlayerId, events: &[BroadcastEvent]) {
        self.send(SessionEvent::BroadcastToPlayer {
            player_id: player.clone(),
            events: events.to_vec(),
        });
    }

    fn on_player_connected(&self, connection: &ConnectionInfo) {
        self.send(SessionEvent::PlayerConnected(connection.clone()));
    }

    fn on_player_disconnected(&self, connection: &ConnectionInfo, reason: DisconnectReason) {
        self.send(SessionEvent::PlayerDisconnected {
            connection: connection.clone(),
            reason,
        });
    }

    fn on_player_reconnecting(&self, connection: &ConnectionInfo) {
        self.send(SessionEvent::PlayerReconnecting(connection.clone()));
    }

    fn on_heartbeat(&self, stats: &HeartbeatStats) {
        self.send(SessionEvent::Heartbeat(stats.clone()));
    }

    fn on_sync_error(&self, player: Option<&PlayerId>, error: &str) {
        self.send(SessionEvent::SyncError {
            player_id: player.cloned(),
            error: error.to_string(),
        });
    }
}
