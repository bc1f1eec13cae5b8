//! Per-domain rate limiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};

#[derive(Debug)]
struct DomainState {
    min_interval: Duration,
    last_request: Option<Instant>,
}

/// Per-domain minimum spacing between outbound requests.
///
/// `acquire` blocks until the configured interval for the domain has
/// elapsed since the previous request, then stamps the domain. Waiters for
/// one domain never block waiters for another: each domain has its own
/// lock, held across the wait so acquisitions are serialized per domain.
#[derive(Debug, Default)]
pub struct RateLimiter {
    domains: Mutex<HashMap<String, Arc<tokio::sync::Mutex<DomainState>>>>,
}

impl RateLimiter {
    /// Create a limiter with no configured domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum interval for a domain.
    ///
    /// Intended for configuration at startup; replacing an interval resets
    /// the domain's last-request stamp.
    pub fn set_interval(&self, domain: &str, min_interval: Duration) {
        let mut domains = self.domains.lock().expect("rate limiter lock poisoned");
        domains.insert(
            domain.to_string(),
            Arc::new(tokio::sync::Mutex::new(DomainState {
                min_interval,
                last_request: None,
            })),
        );
    }

    fn domain_state(&self, domain: &str) -> Option<Arc<tokio::sync::Mutex<DomainState>>> {
        self.domains
            .lock()
            .expect("rate limiter lock poisoned")
            .get(domain)
            .cloned()
    }

    /// Wait until a request to `domain` is allowed, then stamp it.
    ///
    /// Domains without a configured interval pass through immediately.
    pub async fn acquire(&self, domain: &str) {
        let Some(state) = self.domain_state(domain) else {
            return;
        };

        let mut state = state.lock().await;
        if state.min_interval.is_zero() {
            return;
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < state.min_interval {
                let wait = state.min_interval - elapsed;
                tracing::debug!(domain, wait_ms = wait.as_millis() as u64, "rate limiting");
                sleep(wait).await;
            }
        }
        state.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new();
        limiter.set_interval("example.se", Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire("example.se").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_acquires_are_spaced() {
        let limiter = RateLimiter::new();
        limiter.set_interval("example.se", Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire("example.se").await;
        limiter.acquire("example.se").await;
        limiter.acquire("example.se").await;

        // Two waits of one second each.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_domain_passes_through() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.acquire("other.se").await;
        limiter.acquire("other.se").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_independent() {
        let limiter = RateLimiter::new();
        limiter.set_interval("a.se", Duration::from_secs(5));
        limiter.set_interval("b.se", Duration::from_secs(1));

        limiter.acquire("a.se").await;
        let start = Instant::now();
        // b.se has never been hit; the pending a.se interval must not
        // delay it.
        limiter.acquire("b.se").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
