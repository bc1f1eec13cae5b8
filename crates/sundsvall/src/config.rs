//! Engine configuration.
//!
//! Every option can be overridden via environment variables; defaults are
//! tuned for the two Swedish sources and Bolagsverket's hard quotas.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// XBRL document syncing must stay sequential; upstream 429s otherwise.
pub const VDM_MAX_CONCURRENCY: usize = 1;

/// Breaker half-open successes needed to close.
pub const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Freshness window for cached companies, hours.
    pub cache_ttl_hours: i64,

    /// Per-HTTP-call deadline, seconds.
    pub request_timeout: u64,
    /// Connection establishment deadline, seconds.
    pub connect_timeout: u64,

    /// Generic retry count.
    pub max_retries: u32,
    /// Backoff base delay, seconds.
    pub retry_backoff_base: f64,
    /// Backoff cap, seconds.
    pub retry_backoff_max: f64,
    /// Add uniform jitter to backoff.
    pub retry_jitter: bool,

    /// Consecutive failures before a circuit opens.
    pub circuit_failure_threshold: u32,
    /// Seconds an open circuit waits before probing.
    pub circuit_recovery_timeout: u64,

    /// Fan-out width per orgnr (structurally two providers today).
    pub max_parallel_sources: usize,
    /// Batch enrichment worker count.
    pub batch_parallel_workers: usize,

    /// Spacing between XBRL sync calls, seconds.
    pub vdm_request_delay: f64,
    /// Companies per XBRL sync batch.
    pub vdm_batch_size: usize,
    /// Requested XBRL concurrency; hard-capped at [`VDM_MAX_CONCURRENCY`].
    pub vdm_concurrency: usize,

    /// Minimum spacing between Allabolag requests, seconds.
    pub allabolag_delay: f64,
    /// Minimum spacing between Bolagsverket requests, seconds.
    pub bolagsverket_delay: f64,

    /// User agent for outbound requests.
    pub user_agent: String,
    /// SQLite database path.
    pub db_path: PathBuf,

    /// Bolagsverket OAuth client id.
    pub bolagsverket_client_id: Option<String>,
    /// Bolagsverket OAuth client secret.
    pub bolagsverket_client_secret: Option<String>,
    /// OAuth token endpoint.
    pub bolagsverket_token_url: String,
    /// Registry API base URL.
    pub bolagsverket_api_url: String,
    /// Scraper base URL.
    pub allabolag_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            request_timeout: 15,
            connect_timeout: 5,
            max_retries: 3,
            retry_backoff_base: 1.5,
            retry_backoff_max: 30.0,
            retry_jitter: true,
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: 60,
            max_parallel_sources: 2,
            batch_parallel_workers: 5,
            vdm_request_delay: 5.0,
            vdm_batch_size: 10,
            vdm_concurrency: 1,
            allabolag_delay: 1.0,
            bolagsverket_delay: 0.5,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            db_path: PathBuf::from("data/companies.db"),
            bolagsverket_client_id: None,
            bolagsverket_client_secret: None,
            bolagsverket_token_url: sundsvall_sources::registry::TOKEN_URL.to_string(),
            bolagsverket_api_url: sundsvall_sources::registry::API_BASE_URL.to_string(),
            allabolag_base_url: sundsvall_sources::scrape::BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl_hours: env_or("CACHE_TTL_HOURS", defaults.cache_ttl_hours),
            request_timeout: env_or("REQUEST_TIMEOUT", defaults.request_timeout),
            connect_timeout: env_or("CONNECT_TIMEOUT", defaults.connect_timeout),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_backoff_base: env_or("RETRY_BACKOFF", defaults.retry_backoff_base),
            retry_backoff_max: env_or("RETRY_MAX_WAIT", defaults.retry_backoff_max),
            retry_jitter: env_flag("RETRY_JITTER", defaults.retry_jitter),
            circuit_failure_threshold: env_or(
                "CIRCUIT_FAILURES",
                defaults.circuit_failure_threshold,
            ),
            circuit_recovery_timeout: env_or(
                "CIRCUIT_RECOVERY",
                defaults.circuit_recovery_timeout,
            ),
            max_parallel_sources: env_or("MAX_PARALLEL", defaults.max_parallel_sources),
            batch_parallel_workers: env_or("BATCH_WORKERS", defaults.batch_parallel_workers),
            vdm_request_delay: env_or("VDM_REQUEST_DELAY", defaults.vdm_request_delay),
            vdm_batch_size: env_or("VDM_BATCH_SIZE", defaults.vdm_batch_size),
            vdm_concurrency: env_or("VDM_CONCURRENCY", defaults.vdm_concurrency),
            allabolag_delay: env_or("ALLABOLAG_DELAY", defaults.allabolag_delay),
            bolagsverket_delay: env_or("BOLAGSVERKET_DELAY", defaults.bolagsverket_delay),
            user_agent: env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            db_path: env::var("DB_PATH").map_or(defaults.db_path, PathBuf::from),
            bolagsverket_client_id: env::var("BOLAGSVERKET_CLIENT_ID").ok(),
            bolagsverket_client_secret: env::var("BOLAGSVERKET_CLIENT_SECRET").ok(),
            bolagsverket_token_url: env::var("BOLAGSVERKET_TOKEN_URL")
                .unwrap_or(defaults.bolagsverket_token_url),
            bolagsverket_api_url: env::var("BOLAGSVERKET_API_URL")
                .unwrap_or(defaults.bolagsverket_api_url),
            allabolag_base_url: env::var("ALLABOLAG_URL").unwrap_or(defaults.allabolag_base_url),
        }
    }

    /// Effective XBRL concurrency after the hard cap.
    pub fn effective_vdm_concurrency(&self) -> usize {
        if self.vdm_concurrency > VDM_MAX_CONCURRENCY {
            tracing::warn!(
                requested = self.vdm_concurrency,
                max = VDM_MAX_CONCURRENCY,
                "requested XBRL concurrency exceeds the hard cap"
            );
        }
        self.vdm_concurrency.clamp(1, VDM_MAX_CONCURRENCY)
    }

    /// Validate the configuration, returning warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.retry_backoff_base < 1.0 {
            warnings.push("RETRY_BACKOFF should be >= 1".to_string());
        }
        if self.circuit_failure_threshold < 1 {
            warnings.push("CIRCUIT_FAILURES should be >= 1".to_string());
        }
        if self.request_timeout <= self.connect_timeout {
            warnings.push(format!(
                "REQUEST_TIMEOUT ({}s) should exceed CONNECT_TIMEOUT ({}s)",
                self.request_timeout, self.connect_timeout
            ));
        }
        if self.batch_parallel_workers > self.vdm_batch_size {
            warnings.push(format!(
                "BATCH_WORKERS ({}) is greater than VDM_BATCH_SIZE ({})",
                self.batch_parallel_workers, self.vdm_batch_size
            ));
        }
        if self.bolagsverket_client_id.is_none() {
            warnings.push(
                "Bolagsverket credentials not configured; registry lookups will be skipped"
                    .to_string(),
            );
        }

        warnings
    }

    /// Fail fast on configuration that cannot work at runtime.
    pub fn validate_required(&self) -> Result<()> {
        match (
            &self.bolagsverket_client_id,
            &self.bolagsverket_client_secret,
        ) {
            (Some(_), None) | (None, Some(_)) => Err(SyncError::Config(
                "BOLAGSVERKET_CLIENT_ID and BOLAGSVERKET_CLIENT_SECRET must be set together"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| parse_value(&v))
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_value<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}
