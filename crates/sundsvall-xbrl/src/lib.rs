//! iXBRL annual-report parsing for Swedish filings.
//!
//! Annual reports arrive as ZIP archives containing an XHTML document with
//! embedded XBRL tags (`ix:nonFraction` for numeric facts, `ix:nonNumeric`
//! for text). This crate hardens the archive handling, extracts the facts,
//! maps context identifiers to reporting periods, and projects known
//! taxonomy names onto a financial schema.
//!
//! The XHTML is scanned with `quick-xml`, which performs no DTD or
//! external-entity resolution, so untrusted documents cannot trigger XXE.

#![forbid(unsafe_code)]

pub mod archive;
pub mod error;
pub mod facts;
pub mod parse;
pub mod taxonomy;

pub use archive::extract_xhtml;
pub use error::{Result, XbrlError};
pub use facts::{
    AuditInfo, BoardInfo, CompanyFacts, FactValue, FinancialFigures, ParseResult, PeriodType,
    XbrlFact,
};
pub use parse::{parse_document, parse_zip_bytes};
pub use taxonomy::{Availability, FactCategory};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
