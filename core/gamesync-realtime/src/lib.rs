//! Realtime session layer for GameSync.
//!
//! Sits between player connections and the [`SyncEngine`](gamesync_sync::SyncEngine):
//!
//! - **Connections**: registration, heartbeats, progressive demotion of
//!   silent connections
//! - **Optimistic updates**: speculative acceptance with a captured
//!   rollback value, settled in the background
//! - **Broadcast**: debounced, batched fan-out that never echoes an event
//!   back to its author
//! - **Snapshots**: bounded, checksummed history and a persistence seam

pub mod broadcast;
pub mod config;
pub mod connection;
mod error;
pub mod observer;
pub mod optimistic;
pub mod persistence;
mod session;
pub mod snapshot;

pub use broadcast::{BroadcastEvent, BroadcastKind};
pub use config::RealtimeConfig;
pub use connection::{ConnectionInfo, ConnectionStatus, DisconnectReason};
pub use error::{RealtimeError, Result};
pub use observer::{ChannelObserver, HeartbeatStats, NoopSessionObserver, SessionEvent, SessionObserver};
pub use optimistic::{OptimisticUpdate, UpdateStatus};
pub use persistence::{Persistence, PersistenceError, PersistenceResult};
pub use session::{BulkUpdateResult, PlayerAction, RealtimeSession, UpdateResult};
pub use snapshot::{VersionedSnapshot, HISTORY_CAPACITY, HISTORY_TRIM_TO};
