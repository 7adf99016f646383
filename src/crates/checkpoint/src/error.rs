use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur in checkpoint storage.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Database operation failed.
    #[error("checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Snapshot (de)serialization failed.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row was malformed (bad timestamp, negative iteration).
    #[error("corrupt checkpoint row: {0}")]
    Corrupt(String),

    /// Invalid argument (empty session id, etc.).
    #[error("invalid checkpoint request: {0}")]
    Invalid(String),
}
