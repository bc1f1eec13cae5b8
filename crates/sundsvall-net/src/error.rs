//! Error types for outbound HTTP operations.

use thiserror::Error;

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors that can occur while talking to an upstream source.
#[derive(Debug, Error)]
pub enum NetError {
    /// The source's circuit breaker is open; the request was rejected
    /// without being sent.
    #[error("circuit open for source '{0}'")]
    CircuitOpen(String),

    /// The upstream answered with a non-retryable error status, or a
    /// retryable one after all retries were spent.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// Transport-level failure (connect, read, timeout) with no retries
    /// left.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request body cannot be buffered for a retry.
    #[error("request cannot be cloned for retry")]
    NotRetryable,

    /// Token acquisition failed; the provider is treated as unavailable.
    #[error("no OAuth token available for '{0}'")]
    NoToken(String),
}

impl NetError {
    /// Status code carried by this error, if any.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
