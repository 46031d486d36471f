//! Session layer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`RealtimeSession`](crate::RealtimeSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Window in which outgoing events are coalesced into one batch.
    pub broadcast_debounce_ms: u64,
    /// Maximum events delivered per broadcast batch.
    pub max_batch_size: usize,
    /// Period of the connection health tick.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat age after which a connection is flagged as reconnecting.
    /// Connections silent for twice this long are removed.
    pub connection_timeout_ms: u64,
    /// Whether optimistic application is allowed at all.
    pub optimistic_updates: bool,
    pub max_connections: usize,
    pub max_pending_updates: usize,
    /// Optimistic updates unsettled for this long are rejected.
    pub pending_update_ttl_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            broadcast_debounce_ms: 50,
            max_batch_size: 100,
            heartbeat_interval_ms: 5_000,
            connection_timeout_ms: 15_000,
            optimistic_updates: true,
            max_connections: 64,
            max_pending_updates: 1_000,
            pending_update_ttl_ms: 30_000,
        }
    }
}

impl RealtimeConfig {
    pub fn broadcast_debounce(&self) -> Duration {
        Duration::from_millis(self.broadcast_debounce_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn pending_update_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_update_ttl_ms)
    }
}
