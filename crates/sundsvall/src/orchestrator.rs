//! Per-orgnr orchestration: cache probe, parallel provider fan-out,
//! merge, snapshot-first persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};

use sundsvall_model::{CompanyRecord, normalize_orgnr};
use sundsvall_sources::{CompanyProvider, SourceError};
use sundsvall_store::Store;

use crate::error::Result;

/// Progress callback for batch enrichment: (completed, total, orgnr).
pub type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;

/// Orchestrates data retrieval from the cache and the two providers.
///
/// Fetch order per lookup: fresh cache wins; otherwise both providers are
/// queried in parallel and merged, the registry winning on identity
/// fields. Merged results are persisted with a history snapshot before
/// the update, and the persisted form is returned.
pub struct Orchestrator {
    store: Arc<Store>,
    registry: Arc<dyn CompanyProvider>,
    scraper: Arc<dyn CompanyProvider>,
    cache_ttl_hours: i64,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry.name())
            .field("scraper", &self.scraper.name())
            .field("cache_ttl_hours", &self.cache_ttl_hours)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire an orchestrator over a store and two providers.
    pub fn new(
        store: Arc<Store>,
        registry: Arc<dyn CompanyProvider>,
        scraper: Arc<dyn CompanyProvider>,
        cache_ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            registry,
            scraper,
            cache_ttl_hours,
        }
    }

    /// Get the canonical record for a company.
    ///
    /// Returns `Ok(None)` only when no provider produced a usable name.
    /// Dropping the returned future before completion aborts both provider
    /// tasks and persists nothing.
    pub async fn get_company(
        &self,
        orgnr: &str,
        force_refresh: bool,
    ) -> Result<Option<CompanyRecord>> {
        let orgnr = normalize_orgnr(orgnr);

        if !force_refresh && self.store.is_cache_fresh(&orgnr, self.cache_ttl_hours)? {
            if let Some(mut cached) = self.store.get_company(&orgnr)? {
                cached.from_cache = true;
                tracing::info!(orgnr = %orgnr, "cache hit");
                return Ok(Some(cached));
            }
        }

        let (registry_result, scraper_result) = tokio::join!(
            self.registry.fetch_company(&orgnr),
            self.scraper.fetch_company(&orgnr)
        );

        let registry_data = flatten_provider_result(self.registry.name(), &orgnr, registry_result);
        let scraper_data = flatten_provider_result(self.scraper.name(), &orgnr, scraper_result);

        let mut record = CompanyRecord::new(&orgnr);

        if let Some(data) = registry_data {
            record.merge_from(data, false);
            record.source_basic = Some(self.registry.name().to_string());
        }
        if let Some(data) = scraper_data {
            // The registry wins on identity fields; the scraper
            // contributes roles, financials and group structure.
            record.merge_from(data, true);
            record.source_board = Some(self.scraper.name().to_string());
            record.source_financials = Some(self.scraper.name().to_string());
        }

        if record.name.is_none() {
            tracing::warn!(orgnr = %orgnr, "no data found from any provider");
            return Ok(None);
        }

        self.store.store_company_complete(&record, true)?;
        tracing::info!(
            orgnr = %orgnr,
            source_basic = record.source_basic.as_deref().unwrap_or("-"),
            source_board = record.source_board.as_deref().unwrap_or("-"),
            "fetched and stored"
        );

        // Callers always see the persisted form, not the in-flight one.
        Ok(self.store.get_company(&orgnr)?)
    }

    /// Enrich many companies under a bounded worker pool.
    ///
    /// Per-item failures are captured into the result map as `None`;
    /// completion order is not guaranteed. The progress callback fires
    /// once per completed item.
    pub async fn enrich_batch(
        &self,
        orgnrs: &[String],
        max_workers: usize,
        force_refresh: bool,
        progress: Option<&ProgressFn>,
    ) -> HashMap<String, Option<CompanyRecord>> {
        let total = orgnrs.len();
        let completed = AtomicUsize::new(0);
        tracing::info!(count = total, "starting batch enrichment");

        let results: Vec<(String, Option<CompanyRecord>)> = stream::iter(orgnrs.iter().cloned())
            .map(|orgnr| {
                let completed = &completed;
                async move {
                    let data = match self.get_company(&orgnr, force_refresh).await {
                        Ok(data) => data,
                        Err(e) => {
                            tracing::error!(orgnr = %orgnr, error = %e, "batch item failed");
                            None
                        }
                    };
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = progress {
                        callback(done, total, &orgnr);
                    }
                    (orgnr, data)
                }
            })
            .buffer_unordered(max_workers.max(1))
            .collect()
            .await;

        let success_count = results.iter().filter(|(_, v)| v.is_some()).count();
        tracing::info!(
            success_count,
            total_count = total,
            "batch enrichment complete"
        );

        results.into_iter().collect()
    }
}

/// Log provider failures and degrade them to `None`.
fn flatten_provider_result(
    source: &str,
    orgnr: &str,
    result: std::result::Result<Option<CompanyRecord>, SourceError>,
) -> Option<CompanyRecord> {
    match result {
        Ok(data) => data,
        Err(SourceError::Net(sundsvall_net::NetError::CircuitOpen(_))) => {
            tracing::warn!(source, orgnr, "circuit open, skipping fetch");
            None
        }
        Err(e) => {
            tracing::warn!(source, orgnr, error = %e, "provider fetch error");
            None
        }
    }
}
