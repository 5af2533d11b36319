//! Client error types.

use flagship_eval::EvalError;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Request failed with status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Response or event payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configured URI is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration value missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Flag evaluation failed.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// No flags arrived within the start wait time.
    #[error("Flags were not initialized within {0:?}")]
    InitializationTimeout(Duration),
}
