//! Error types for the release history event store.

use thiserror::Error;

/// Result type alias for event store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while appending or querying events.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before any persistence attempt.
    #[error("{0}")]
    Validation(String),

    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// True when the caller supplied bad input, as opposed to a backend failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
