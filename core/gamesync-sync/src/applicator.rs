//! State applicator - writes committed operations into the state tree.
//!
//! The engine never interprets payloads; it hands the working copy of the
//! tree to a `StateApplicator`. The default [`PathApplicator`] performs plain
//! path writes. Deployments that mirror state into another model (an ECS
//! world, a rules engine) supply their own implementation; an error from it
//! aborts the commit and leaves the authoritative state and version vector
//! untouched.

use gamesync_types::{OperationType, StatePath, SyncOperation};
use serde_json::Value;
use tracing::debug;

/// Result type for applicator operations.
pub type ApplicatorResult<T> = Result<T, ApplicatorError>;

/// Errors that can occur while applying an operation.
#[derive(Debug, thiserror::Error)]
pub enum ApplicatorError {
    #[error("path error: {0}")]
    Path(#[from] gamesync_types::Error),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("rejected by downstream: {0}")]
    Rejected(String),
}

/// Applies one operation to a mutable working copy of the state.
pub trait StateApplicator: Send + Sync {
    /// Writes `value` for `op` at `path`.
    ///
    /// `value` is the value chosen by conflict resolution, which may differ
    /// from `op.new_value` (e.g. after a merge).
    fn apply(
        &self,
        state: &mut Value,
        path: &StatePath,
        op: &SyncOperation,
        value: Option<&Value>,
    ) -> ApplicatorResult<()>;
}

/// Applies operations as direct path writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathApplicator;

impl StateApplicator for PathApplicator {
    fn apply(
        &self,
        state: &mut Value,
        path: &StatePath,
        op: &SyncOperation,
        value: Option<&Value>,
    ) -> ApplicatorResult<()> {
        debug!("Applying {:?} at `{}`", op.op_type, path);

        match op.op_type {
            OperationType::Create | OperationType::Update => {
                let value = value.ok_or_else(|| {
                    ApplicatorError::InvalidOperation(format!("{:?} without a value", op.op_type))
                })?;
                path.set(state, value.clone())?;
            }
            OperationType::Delete => {
                path.remove(state)?;
            }
            OperationType::Batch => {
                let members = value.and_then(Value::as_object).ok_or_else(|| {
                    ApplicatorError::InvalidOperation("batch value must be an object".into())
                })?;
                for (relative, member) in members {
                    path.join(relative)?.set(state, member.clone())?;
                }
            }
        }
        Ok(())
    }
}
