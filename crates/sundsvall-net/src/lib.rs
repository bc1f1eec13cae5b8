//! Outbound HTTP plumbing for the Sundsvall engine.
//!
//! Every upstream request goes through the [`Gateway`], which composes the
//! per-source [`CircuitBreaker`], the per-domain [`RateLimiter`] and the
//! [`RetryPolicy`] around a shared `reqwest` client. OAuth2 tokens for the
//! registry API are minted by the [`TokenManager`], which is deliberately
//! not routed through the breaker.

#![forbid(unsafe_code)]

pub mod breaker;
pub mod error;
pub mod gateway;
pub mod rate;
pub mod retry;
pub mod token;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitState, CircuitStatus};
pub use error::{NetError, Result};
pub use gateway::{Gateway, GatewayConfig};
pub use rate::RateLimiter;
pub use retry::RetryPolicy;
pub use token::{TokenConfig, TokenManager};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
