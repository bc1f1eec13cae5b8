//! The Sundsvall company-data ingestion and consolidation engine.
//!
//! Aggregates authoritative Swedish company data from the Bolagsverket
//! registry API and the Allabolag scraper into one canonical record per
//! organization number, with history snapshots before every mutation, and
//! runs the annual-report (iXBRL) synchronization pipeline.
//!
//! [`Engine`] wires the pieces together from a [`Config`]; the
//! [`Orchestrator`] serves single lookups and batch enrichment;
//! [`ReportSync`] walks the tracked-company set for annual reports.

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod report_sync;

pub use config::Config;
pub use engine::Engine;
pub use error::{Result, SyncError};
pub use orchestrator::Orchestrator;
pub use report_sync::{BatchSyncReport, CompanySyncReport, ReportSync};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
