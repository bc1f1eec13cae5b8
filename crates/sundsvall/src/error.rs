//! Top-level error type.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the orchestration and sync layers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] sundsvall_store::StoreError),

    /// Provider adapter failure.
    #[error(transparent)]
    Source(#[from] sundsvall_sources::SourceError),

    /// Outbound HTTP failure.
    #[error(transparent)]
    Net(#[from] sundsvall_net::NetError),

    /// Annual-report parsing failure.
    #[error(transparent)]
    Xbrl(#[from] sundsvall_xbrl::XbrlError),

    /// Invalid or incomplete configuration, surfaced at startup.
    #[error("configuration error: {0}")]
    Config(String),
}
