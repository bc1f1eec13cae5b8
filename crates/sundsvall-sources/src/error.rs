//! Error types for provider adapters.

use thiserror::Error;

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors a provider adapter can surface.
///
/// Adapters map not-found and provider-wide outages to `Ok(None)`; these
/// variants cover everything else, and the orchestrator logs them and
/// treats the provider as having produced nothing.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport or protocol failure from the gateway.
    #[error(transparent)]
    Net(#[from] sundsvall_net::NetError),

    /// The provider returned a payload that could not be decoded.
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Authentication kept failing after the single token-refresh retry.
    #[error("authentication failed for source '{0}'")]
    Auth(String),
}
