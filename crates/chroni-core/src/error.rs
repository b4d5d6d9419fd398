//! Error types for chroni-core

use thiserror::Error;

/// Result type alias using chroni-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in chroni-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable store cannot open, read or write. Records have no
    /// further fallback, so this is the one storage failure the user sees.
    #[error("Cannot save this session: local storage is unavailable ({0})")]
    StorageUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote already confirmed this record; confirmed records are
    /// append-only
    #[error("Record {0} is already synced and cannot be rewritten")]
    RecordAlreadySynced(String),

    /// Account import already ran for this owner
    #[error("Local records were already imported for account {0}")]
    ImportAlreadyCompleted(String),
}

impl Error {
    /// Whether this error means the durable store itself is unusable.
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::LibSql(_))
    }
}
