//! Annual-report synchronization.
//!
//! Walks companies, lists their annual-report documents, downloads and
//! parses the iXBRL archives, and persists reports and facts. Document
//! endpoints enforce hard quotas upstream, so syncing is sequential with
//! explicit spacing between companies.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tokio::sync::Semaphore;

use sundsvall_model::normalize_orgnr;
use sundsvall_sources::BolagsverketClient;
use sundsvall_store::Store;
use sundsvall_xbrl::parse_zip_bytes;

use crate::config::Config;
use crate::error::Result;

/// Errors kept per batch in the aggregated report.
const MAX_ERRORS_PER_BATCH: usize = 10;

/// Errors kept per full run.
const MAX_ERRORS_PER_RUN: usize = 100;

/// Pause between batches.
const INTER_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Outcome of syncing one company.
#[derive(Debug, Default, Clone)]
pub struct CompanySyncReport {
    /// Organization number.
    pub orgnr: String,
    /// Documents within the year window.
    pub reports_found: usize,
    /// Reports parsed and stored.
    pub reports_processed: usize,
    /// Reports that failed to download, parse or store.
    pub reports_failed: usize,
    /// Error descriptions for the failures.
    pub errors: Vec<String>,
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Default, Clone)]
pub struct BatchSyncReport {
    /// Companies in the run.
    pub total_companies: usize,
    /// Companies whose sync completed (with or without failures).
    pub companies_processed: usize,
    /// Sum of documents found.
    pub total_reports_found: usize,
    /// Sum of reports stored.
    pub total_reports_processed: usize,
    /// Sum of report failures.
    pub total_reports_failed: usize,
    /// Batches completed.
    pub batches_completed: usize,
    /// Truncated error list.
    pub errors: Vec<String>,
}

/// Annual-report sync service.
#[derive(Debug)]
pub struct ReportSync {
    registry: Arc<BolagsverketClient>,
    store: Arc<Store>,
    request_delay: Duration,
    batch_size: usize,
    concurrency: usize,
}

impl ReportSync {
    /// Wire the sync service from configuration.
    pub fn new(registry: Arc<BolagsverketClient>, store: Arc<Store>, config: &Config) -> Self {
        Self {
            registry,
            store,
            request_delay: Duration::from_secs_f64(config.vdm_request_delay.max(0.0)),
            batch_size: config.vdm_batch_size.max(1),
            concurrency: config.effective_vdm_concurrency(),
        }
    }

    /// Sync annual reports for one company.
    ///
    /// Documents older than `years` before the current year are skipped,
    /// as are reports already stored as processed (unless `force`).
    /// Per-document failures are captured and the loop continues.
    pub async fn sync_company(&self, orgnr: &str, years: i32, force: bool) -> CompanySyncReport {
        let orgnr = normalize_orgnr(orgnr);
        let mut report = CompanySyncReport {
            orgnr: orgnr.clone(),
            ..CompanySyncReport::default()
        };

        let documents = match self.registry.list_documents(&orgnr).await {
            Ok(docs) => docs,
            Err(e) => {
                report.errors.push(format!("document list failed: {e}"));
                return report;
            }
        };
        if documents.is_empty() {
            tracing::info!(orgnr = %orgnr, "no annual reports found");
            return report;
        }

        let min_year = Utc::now().year() - years;
        let documents: Vec<_> = documents
            .into_iter()
            .filter(|doc| doc.fiscal_year().is_some_and(|y| y >= min_year))
            .collect();
        report.reports_found = documents.len();

        for doc in documents {
            let Some(document_id) = doc.document_id().map(String::from) else {
                tracing::warn!(orgnr = %orgnr, "document without id, skipping");
                continue;
            };
            let Some(fiscal_year) = doc.fiscal_year() else {
                continue;
            };

            if !force {
                let already_processed = self
                    .store
                    .get_annual_report(&orgnr, fiscal_year)
                    .ok()
                    .flatten()
                    .is_some_and(|r| r.processing_status == "processed");
                if already_processed {
                    tracing::debug!(orgnr = %orgnr, fiscal_year, "already processed, skipping");
                    continue;
                }
            }

            match self.process_document(&orgnr, &document_id, fiscal_year).await {
                Ok(()) => report.reports_processed += 1,
                Err(message) => {
                    report.reports_failed += 1;
                    report.errors.push(message);
                }
            }
        }

        report
    }

    /// Download, parse and store one document. Returns a captured error
    /// message on failure; the stored report (if any) is marked failed.
    async fn process_document(
        &self,
        orgnr: &str,
        document_id: &str,
        fiscal_year: i32,
    ) -> std::result::Result<(), String> {
        let zip = match self.registry.download_document(document_id).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(format!("failed to download {document_id}")),
            Err(e) => return Err(format!("download error for {document_id}: {e}")),
        };

        let parsed = match parse_zip_bytes(&zip) {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = self.store.mark_report_failed(orgnr, fiscal_year);
                return Err(format!("parse failed for {orgnr}/{fiscal_year}: {e}"));
            }
        };

        if parsed.company.orgnr.is_empty() {
            let _ = self.store.mark_report_failed(orgnr, fiscal_year);
            return Err(format!("no company info extracted for {orgnr}/{fiscal_year}"));
        }

        match self.store.store_annual_report(&parsed, Some(document_id)) {
            Ok(_) => {
                tracing::info!(orgnr, fiscal_year, "processed annual report");
                Ok(())
            }
            Err(e) => {
                let _ = self.store.mark_report_failed(orgnr, fiscal_year);
                Err(format!("storage failed for {orgnr}/{fiscal_year}: {e}"))
            }
        }
    }

    /// Sync a set of companies under the concurrency cap.
    ///
    /// The request delay is awaited inside the semaphore before each
    /// company, spacing calls against the document endpoints.
    pub async fn sync_batch(
        &self,
        orgnrs: &[String],
        years: i32,
        force: bool,
    ) -> BatchSyncReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let tasks = orgnrs.iter().map(|orgnr| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("sync semaphore never closes");
                tokio::time::sleep(self.request_delay).await;
                self.sync_company(orgnr, years, force).await
            }
        });

        let company_reports = futures::future::join_all(tasks).await;

        let mut batch = BatchSyncReport {
            total_companies: orgnrs.len(),
            ..BatchSyncReport::default()
        };
        for report in company_reports {
            batch.companies_processed += 1;
            batch.total_reports_found += report.reports_found;
            batch.total_reports_processed += report.reports_processed;
            batch.total_reports_failed += report.reports_failed;
            batch
                .errors
                .extend(report.errors.into_iter().take(MAX_ERRORS_PER_BATCH));
        }
        batch.errors.truncate(MAX_ERRORS_PER_BATCH);
        batch
    }

    /// Sync every tracked company, in batches.
    pub async fn sync_all_tracked_companies(&self, years: i32) -> Result<BatchSyncReport> {
        let orgnrs = self.store.all_orgnrs()?;
        let total_batches = orgnrs.len().div_ceil(self.batch_size.max(1));
        tracing::info!(
            companies = orgnrs.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "starting full annual-report sync"
        );

        let mut total = BatchSyncReport {
            total_companies: orgnrs.len(),
            ..BatchSyncReport::default()
        };

        for (batch_num, chunk) in orgnrs.chunks(self.batch_size).enumerate() {
            tracing::info!(
                batch = batch_num + 1,
                total_batches,
                companies = chunk.len(),
                "processing batch"
            );

            let batch = self.sync_batch(chunk, years, false).await;

            total.companies_processed += batch.companies_processed;
            total.total_reports_found += batch.total_reports_found;
            total.total_reports_processed += batch.total_reports_processed;
            total.total_reports_failed += batch.total_reports_failed;
            total.batches_completed += 1;

            if total.errors.len() < MAX_ERRORS_PER_RUN {
                total
                    .errors
                    .extend(batch.errors.into_iter().take(MAX_ERRORS_PER_BATCH));
            }

            if batch_num + 1 < total_batches {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }
        }

        total.errors.truncate(MAX_ERRORS_PER_RUN);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_wiring_applies_caps() {
        let store = Arc::new(Store::in_memory().unwrap());
        let gateway = test_gateway();
        let registry = Arc::new(BolagsverketClient::new(gateway, None, None));

        let config = Config {
            vdm_concurrency: 4,
            vdm_batch_size: 0,
            vdm_request_delay: -1.0,
            ..Config::default()
        };
        let sync = ReportSync::new(registry, store, &config);

        assert_eq!(sync.concurrency, 1);
        assert_eq!(sync.batch_size, 1);
        assert_eq!(sync.request_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_sync_company_without_credentials_finds_nothing() {
        // No OAuth credentials: the document list degrades to empty and
        // the report comes back with zeros.
        let store = Arc::new(Store::in_memory().unwrap());
        let registry = Arc::new(BolagsverketClient::new(test_gateway(), None, None));
        let sync = ReportSync::new(registry, store, &Config::default());

        let report = sync.sync_company("5560125791", 5, false).await;
        assert_eq!(report.reports_found, 0);
        assert_eq!(report.reports_processed, 0);
        assert!(report.errors.is_empty());
    }

    fn test_gateway() -> Arc<sundsvall_net::Gateway> {
        Arc::new(
            sundsvall_net::Gateway::new(
                sundsvall_net::GatewayConfig::default(),
                Arc::new(sundsvall_net::RateLimiter::new()),
                Arc::new(sundsvall_net::BreakerRegistry::with_defaults()),
            )
            .unwrap(),
        )
    }
}
