//! Error types for validation and repair.

use thiserror::Error;

/// Result type for validator operations.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Errors that can occur while registering rules or applying fixes.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("rule already registered: {0}")]
    DuplicateRule(String),

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// The rule has no automatic fix for this violation.
    #[error("violation at `{0}` is not auto-fixable")]
    NotFixable(String),

    #[error("fix failed: {0}")]
    FixFailed(String),

    #[error("path error: {0}")]
    Path(#[from] gamesync_types::Error),
}
