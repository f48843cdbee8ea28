//! Error types for dbutil.

use thiserror::Error;

/// The main error type for dbutil operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Malformed or unknown condition key, missing required condition,
    /// or a filter value that does not fit its operator.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Bad batch size, mismatched batch columns, empty payloads, unsafe identifiers.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected the statement.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The session was already closed.
    #[error("Session is closed")]
    Closed,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for the errors raised before any SQL reaches the backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidCondition(_) | Self::InvalidArgument(_))
    }
}

/// Result type alias for dbutil operations.
pub type DbResult<T> = Result<T, DbError>;
