//! Error types for the service registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
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

    #[error("instance already registered: {0}")]
    Duplicate(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}
