//! Error types for fairshare

use thiserror::Error;

/// Main error type for fairshare
#[derive(Error, Debug)]
pub enum FairshareError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Usage source error (backend unreachable, bad response, canned failure)
    #[error("Usage source error: {0}")]
    Source(String),

    /// A single metrics query failed
    #[error("Query error: {0}")]
    Query(String),

    /// Queue tree could not be built from the desired state
    #[error("Queue hierarchy error: {0}")]
    QueueHierarchy(String),

    /// Resource name that looks like a MIG profile but cannot be parsed
    #[error("Invalid MIG resource: {0}")]
    InvalidMigResource(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for fairshare operations
pub type FairshareResult<T> = Result<T, FairshareError>;

impl From<serde_json::Error> for FairshareError {
    fn from(err: serde_json::Error) -> Self {
        FairshareError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FairshareError {
    fn from(err: toml::de::Error) -> Self {
        FairshareError::Config(err.to_string())
    }
}
