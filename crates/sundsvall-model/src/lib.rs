//! Canonical data model for the Sundsvall company-data engine.
//!
//! Every entity is keyed by a normalized 10-digit Swedish organization
//! number (`orgnr`). Providers fill a partial [`CompanyRecord`]; the
//! orchestrator merges partials into the canonical record persisted by the
//! store.

#![forbid(unsafe_code)]

pub mod company;
pub mod orgnr;
pub mod roles;

pub use company::{
    Announcement, CompanyRecord, CompanyStatus, FinancialPeriod, Industry, RegistryEntry,
    RelatedCompany, SearchHit, Trademark,
};
pub use orgnr::{format_orgnr, normalize_orgnr};
pub use roles::{Role, RoleCategory};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
