//! SQLite persistence for the Sundsvall engine.
//!
//! One [`Store`] owns the connection and exposes entity operations plus
//! the two composite operations the orchestrator relies on:
//! [`Store::store_company_complete`] (snapshot-first persistence) and
//! [`Store::is_cache_fresh`]. Annual-report and XBRL-fact persistence
//! lives in the `xbrl` module as further `impl Store` blocks.

#![forbid(unsafe_code)]

pub mod error;
pub mod sanitize;
mod store;
mod xbrl;

pub use error::{Result, StoreError};
pub use sanitize::sanitize_search_input;
pub use store::{CacheMetadata, HistorySnapshot, Store, StoreStats};
pub use xbrl::{AnnualReportRow, XbrlFactRow};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
