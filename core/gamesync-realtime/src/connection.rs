//! Connection tracking.
//!
//! A connection moves connected → reconnecting once its heartbeat is older
//! than the timeout, and is removed once it stays silent past twice the
//! timeout. Any heartbeat puts it back to connected.

use gamesync_types::{ConnectionId, PlayerId, Timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Health of a player's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The player unregistered.
    Unregistered,
    /// No heartbeat for twice the connection timeout.
    TimedOut,
    /// Displaced by a newer registration while at capacity.
    Evicted,
}

/// A registered player connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub player_id: PlayerId,
    pub connection_id: ConnectionId,
    /// Monotonic time of the last heartbeat; drives the health tick.
    #[serde(skip)]
    pub last_heartbeat: Instant,
    /// Wall-clock time of the last heartbeat, for reporting.
    pub last_seen: Timestamp,
    pub status: ConnectionStatus,
    pub lag: Duration,
    /// State version the client last acknowledged.
    pub version: u64,
}

impl ConnectionInfo {
    pub fn new(player_id: PlayerId, connection_id: ConnectionId, version: u64) -> Self {
        Self {
            player_id,
            connection_id,
            last_heartbeat: Instant::now(),
            last_seen: Timestamp::now(),
            status: ConnectionStatus::Connected,
            lag: Duration::ZERO,
            version,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Outcome of one health tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HealthSweep {
    /// Connections newly flagged as reconnecting.
    pub reconnecting: Vec<ConnectionInfo>,
    /// Connections removed for silence.
    pub removed: Vec<ConnectionInfo>,
}

/// Connections keyed by player, bounded by capacity.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<PlayerId, ConnectionInfo>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Registers (or replaces) a connection.
    ///
    /// At capacity, the connection with the oldest heartbeat is evicted and
    /// returned.
    pub fn register(&mut self, info: ConnectionInfo) -> Option<ConnectionInfo> {
        let mut evicted = None;
        if !self.connections.contains_key(&info.player_id) && self.connections.len() >= self.capacity {
            let oldest = self
                .connections
                .values()
                .min_by_key(|c| c.last_heartbeat)
                .map(|c| c.player_id.clone());
            if let Some(player) = oldest {
                info!("Connection registry full; evicting {}", player);
                evicted = self.connections.remove(&player);
            }
        }
        debug!("Registered {} on {}", info.player_id, info.connection_id);
        self.connections.insert(info.player_id.clone(), info);
        evicted
    }

    pub fn remove(&mut self, player: &PlayerId) -> Option<ConnectionInfo> {
        self.connections.remove(player)
    }

    /// Records a heartbeat. Returns false for unknown players.
    pub fn heartbeat(&mut self, player: &PlayerId, lag: Duration) -> bool {
        let Some(conn) = self.connections.get_mut(player) else {
            return false;
        };
        if conn.status != ConnectionStatus::Connected {
            info!("{} is back ({:?} lag)", player, lag);
        }
        conn.last_heartbeat = Instant::now();
        conn.last_seen = Timestamp::now();
        conn.status = ConnectionStatus::Connected;
        conn.lag = lag;
        true
    }

    /// Demotes or removes silent connections as of `now`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> HealthSweep {
        let mut sweep = HealthSweep::default();
        let mut expired = Vec::new();

        for conn in self.connections.values_mut() {
            let age = now.saturating_duration_since(conn.last_heartbeat);
            if age > timeout * 2 {
                expired.push(conn.player_id.clone());
            } else if age > timeout && conn.status == ConnectionStatus::Connected {
                conn.status = ConnectionStatus::Reconnecting;
                sweep.reconnecting.push(conn.clone());
            }
        }

        for player in expired {
            if let Some(mut conn) = self.connections.remove(&player) {
                info!("Dropping {} after {:?} without heartbeat", player, timeout * 2);
                conn.status = ConnectionStatus::Disconnected;
                sweep.removed.push(conn);
            }
        }
        sweep
    }

    pub fn get(&self, player: &PlayerId) -> Option<&ConnectionInfo> {
        self.connections.get(player)
    }

    pub fn get_mut(&mut self, player: &PlayerId) -> Option<&mut ConnectionInfo> {
        self.connections.get_mut(player)
    }

    /// All connections, ordered by player id.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<_> = self.connections.values().cloned().collect();
        all.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        all
    }

    /// Players currently in the connected state.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<_> = self
            .connections
            .values()
            .filter(|c| c.is_connected())
            .map(|c| c.player_id.clone())
            .collect();
        players.sort();
        players
    }

    pub fn count(&self, status: ConnectionStatus) -> usize {
        self.connections.values().filter(|c| c.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
