//! Engine wiring: explicit construction of every component from the
//! configuration, replacing any notion of process-wide singletons.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use sundsvall_model::SearchHit;
use sundsvall_net::{BreakerRegistry, CircuitStatus, Gateway, GatewayConfig, RateLimiter, RetryPolicy};
use sundsvall_sources::{AllabolagScraper, BolagsverketClient};
use sundsvall_store::Store;

use crate::config::{CIRCUIT_SUCCESS_THRESHOLD, Config};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::report_sync::ReportSync;

/// The assembled engine.
///
/// Construct once at startup and share; every component is behind an
/// `Arc`, and teardown is dropping the value.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    store: Arc<Store>,
    gateway: Arc<Gateway>,
    bolagsverket: Arc<BolagsverketClient>,
    allabolag: Arc<AllabolagScraper>,
    orchestrator: Orchestrator,
    report_sync: ReportSync,
}

impl Engine {
    /// Build the engine from configuration.
    ///
    /// Validates required credentials, opens the store, and wires the
    /// shared rate limiter, breaker registry and gateway into both
    /// providers.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate_required()?;
        for warning in config.validate() {
            tracing::warn!("config: {warning}");
        }

        let limiter = Arc::new(RateLimiter::new());
        if let Some(domain) = host_of(&config.allabolag_base_url) {
            limiter.set_interval(&domain, Duration::from_secs_f64(config.allabolag_delay));
        }
        if let Some(domain) = host_of(&config.bolagsverket_api_url) {
            limiter.set_interval(&domain, Duration::from_secs_f64(config.bolagsverket_delay));
        }

        let breakers = Arc::new(BreakerRegistry::new(
            config.circuit_failure_threshold,
            Duration::from_secs(config.circuit_recovery_timeout),
            CIRCUIT_SUCCESS_THRESHOLD,
        ));

        let gateway = Arc::new(Gateway::new(
            GatewayConfig {
                request_timeout: Duration::from_secs(config.request_timeout),
                connect_timeout: Duration::from_secs(config.connect_timeout),
                user_agent: config.user_agent.clone(),
                retry: RetryPolicy::new(
                    config.max_retries,
                    Duration::from_secs_f64(config.retry_backoff_base),
                    Duration::from_secs_f64(config.retry_backoff_max),
                    2.0,
                    config.retry_jitter,
                ),
            },
            limiter,
            breakers,
        )?);

        let store = Arc::new(Store::new(&config.db_path)?);

        let bolagsverket = Arc::new(BolagsverketClient::with_urls(
            gateway.clone(),
            config.bolagsverket_client_id.clone(),
            config.bolagsverket_client_secret.clone(),
            &config.bolagsverket_token_url,
            &config.bolagsverket_api_url,
        ));
        let allabolag = Arc::new(AllabolagScraper::with_base_url(
            gateway.clone(),
            &config.allabolag_base_url,
        ));

        let orchestrator = Orchestrator::new(
            store.clone(),
            bolagsverket.clone(),
            allabolag.clone(),
            config.cache_ttl_hours,
        );
        let report_sync = ReportSync::new(bolagsverket.clone(), store.clone(), &config);

        Ok(Self {
            config,
            store,
            gateway,
            bolagsverket,
            allabolag,
            orchestrator,
            report_sync,
        })
    }

    /// Engine configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The registry API client.
    pub fn bolagsverket(&self) -> &Arc<BolagsverketClient> {
        &self.bolagsverket
    }

    /// The per-orgnr orchestrator.
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// The annual-report sync service.
    pub const fn report_sync(&self) -> &ReportSync {
        &self.report_sync
    }

    /// Search the store, topping up from the live scraper when the store
    /// alone cannot fill the limit. Results are de-duplicated by orgnr.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut results = self.store.search_companies(query, limit)?;
        if results.len() >= limit {
            return Ok(results);
        }

        match self.allabolag.search(query, limit).await {
            Ok(hits) => {
                for hit in hits {
                    if !results.iter().any(|r| r.orgnr == hit.orgnr) {
                        results.push(hit);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "external search failed"),
        }

        results.truncate(limit);
        Ok(results)
    }

    /// Breaker status for every source seen so far.
    pub fn circuit_status(&self) -> Vec<CircuitStatus> {
        self.gateway.breakers().all_status()
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_extraction() {
        assert_eq!(
            host_of("https://www.allabolag.se").as_deref(),
            Some("www.allabolag.se")
        );
        assert_eq!(
            host_of("https://gw.api.bolagsverket.se/vardefulla-datamangder/v1").as_deref(),
            Some("gw.api.bolagsverket.se")
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_engine_from_config_in_memory() {
        let config = Config {
            db_path: ":memory:".into(),
            ..Config::default()
        };
        let engine = Engine::from_config(config).unwrap();
        assert!(engine.circuit_status().is_empty());
        assert!(!engine.bolagsverket().is_configured());
    }

    #[test]
    fn test_engine_rejects_half_credentials() {
        let config = Config {
            db_path: ":memory:".into(),
            bolagsverket_client_id: Some("id".into()),
            ..Config::default()
        };
        assert!(Engine::from_config(config).is_err());
    }
}
