//! Boundary interface for the legal-announcement bulletin source.

use async_trait::async_trait;
use sundsvall_model::Announcement;

use crate::error::Result;

/// Source of legal-announcement records for a company.
///
/// The production implementation drives a browser against the official
/// bulletin service and lives outside this engine; the core only consumes
/// the records it produces.
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Fetch announcements published for a company.
    async fn fetch_announcements(&self, orgnr: &str) -> Result<Vec<Announcement>>;
}
