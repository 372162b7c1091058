//! Error type shared by every storage backend

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// Missing logs/entries are *not* errors on the raw/legacy path; those
/// operations return `None`/`false`. Structured entry operations against a
/// log that does not exist fail with [`StoreError::LogNotFound`], and that
/// asymmetry is part of the contract.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Structured operation against a log that does not exist.
    #[error("log not found: {0}")]
    LogNotFound(String),

    /// Create collided with an existing log of the same tenant and name.
    #[error("log already exists: {0}")]
    LogAlreadyExists(String),

    /// Backend-specific failure (connection drop, protocol error, ...).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Document (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
