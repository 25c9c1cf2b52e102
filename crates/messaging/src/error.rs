//! Messaging error types

use thiserror::Error;

/// Errors surfaced by the messaging core
///
/// Live-delivery failures never appear here; they are logged by the
/// dispatcher and do not fail the triggering operation.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => MessagingError::NotFound("record"),
            other => {
                tracing::error!(error = ?other, "Messaging storage error");
                MessagingError::Storage(other.to_string())
            }
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
