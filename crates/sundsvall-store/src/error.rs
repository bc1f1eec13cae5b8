//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error (history snapshots, namespace lists).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record without an orgnr cannot be persisted.
    #[error("record has no orgnr")]
    MissingOrgnr,

    /// An annual report without a fiscal year cannot be persisted.
    #[error("annual report for {0} has no fiscal year")]
    MissingFiscalYear(String),
}
