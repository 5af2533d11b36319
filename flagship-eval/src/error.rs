//! Error types for flag evaluation.

use thiserror::Error;

/// Result type for evaluation operations.
pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluation errors.
///
/// Missing flags, stale writes and lock timeouts are not errors. They resolve to
/// the caller's default value or to a [`WriteOutcome`](crate::WriteOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A target rule uses an operator this engine does not implement
    #[error("Unrecognized rule operator: {0}")]
    UnrecognizedOperator(String),

    /// The evaluation context failed validation
    #[error("Invalid evaluation context: {0}")]
    InvalidContext(String),

    /// The flag definition is structurally unusable
    #[error("Malformed flag: {0}")]
    MalformedFlag(String),
}
