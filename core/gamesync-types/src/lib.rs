//! Core type definitions for GameSync.
//!
//! This crate defines the payload-agnostic types shared by the sync engine,
//! the realtime session layer and the consistency validator:
//! - Operation, player, connection and conflict identifiers (UUID v7)
//! - Millisecond wall-clock timestamps
//! - Dot-path addressing into JSON state trees
//! - Mutation descriptors (`SyncOperation`) and their metadata
//! - The copy-on-write `GameState` snapshot
//!
//! Game semantics (what a "player" or a "space" means) live in the rule
//! engine that produces the payloads, not here.

mod ids;
mod operation;
mod path;
mod state;
mod timestamp;

pub use ids::{ConflictId, ConnectionId, OperationId, PlayerId, UpdateId};
pub use operation::{OperationMetadata, OperationType, Priority, SyncOperation};
pub use path::{PathSegment, StatePath};
pub use state::GameState;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path `{0}` does not exist")]
    PathNotFound(String),

    #[error("type mismatch at `{path}`: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },
}
