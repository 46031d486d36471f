//! Error types for the sync layer.

use crate::applicator::ApplicatorError;
use gamesync_types::ConflictId;
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Most of these never reach callers as `Err`: the engine folds them into a
/// failed [`SyncResult`](crate::SyncResult). They are returned directly only
/// from administrative calls such as manual conflict resolution.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation is malformed (bad path, missing value, ...).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Applying the operation to the state tree failed.
    #[error("apply failed: {0}")]
    Apply(#[from] ApplicatorError),

    /// The operation queue is at capacity.
    #[error("operation queue full ({0} entries)")]
    QueueFull(usize),

    /// No manual conflict with that id is pending.
    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// The operation was withdrawn from the queue before it was committed.
    #[error("operation withdrawn before commit")]
    Withdrawn,

    /// The engine shut down before settling a queued operation.
    #[error("channel closed")]
    ChannelClosed,
}
