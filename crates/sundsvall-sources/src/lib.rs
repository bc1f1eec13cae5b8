//! Provider adapters for the Sundsvall engine.
//!
//! Two adapters produce partial [`sundsvall_model::CompanyRecord`]s: the
//! Bolagsverket registry API (OAuth2/JSON, authoritative identity data and
//! annual-report documents) and the Allabolag scraper (embedded-JSON HTML
//! pages carrying financials, roles and group structure). Both route every
//! request through the shared [`sundsvall_net::Gateway`].

#![forbid(unsafe_code)]

pub mod announce;
pub mod error;
pub mod provider;
pub mod registry;
pub mod scrape;

pub use announce::AnnouncementSource;
pub use error::{Result, SourceError};
pub use provider::CompanyProvider;
pub use registry::{BolagsverketClient, DocumentMeta};
pub use scrape::AllabolagScraper;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
