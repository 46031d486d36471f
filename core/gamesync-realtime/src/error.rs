//! Error types for the session layer.

use crate::persistence::PersistenceError;
use gamesync_types::PlayerId;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur in the session layer.
///
/// Update paths fold these into an [`UpdateResult`](crate::UpdateResult);
/// snapshot and resync calls return them directly.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// No connection is registered for the player.
    #[error("unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// The player's connection is not in the connected state.
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),

    /// The engine settled the operation without applying it.
    #[error("update not applied: {0}")]
    NotApplied(String),

    /// Snapshot persistence failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
