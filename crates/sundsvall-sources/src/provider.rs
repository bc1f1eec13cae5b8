//! The provider seam the orchestrator fans out over.

use async_trait::async_trait;
use sundsvall_model::CompanyRecord;

use crate::error::Result;

/// A data source able to produce a partial company record.
#[async_trait]
pub trait CompanyProvider: Send + Sync {
    /// Stable provider name, used for provenance fields and circuit
    /// breaker keys.
    fn name(&self) -> &'static str;

    /// Fetch whatever this provider knows about a company.
    ///
    /// `Ok(None)` means not found or provider-wide outage for this call;
    /// errors never carry partial data.
    async fn fetch_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>>;
}
