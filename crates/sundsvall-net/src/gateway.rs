//! The single outbound request primitive.
//!
//! Composition order per attempt: circuit breaker check, per-domain rate
//! limiting, the timed request itself, then status-based retry. The
//! breaker is notified exactly once per logical call with the outcome of
//! the last attempt.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Request, Response};
use tokio::time::sleep;

use crate::breaker::BreakerRegistry;
use crate::error::{NetError, Result};
use crate::rate::RateLimiter;
use crate::retry::RetryPolicy;

/// Gateway construction parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Connection establishment deadline.
    pub connect_timeout: Duration,
    /// User agent sent on every request.
    pub user_agent: String,
    /// Default retry policy.
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("sundsvall/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Single outbound request primitive shared by all adapters.
#[derive(Debug)]
pub struct Gateway {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
}

impl Gateway {
    /// Build a gateway around shared limiter and breaker state.
    pub fn new(
        config: GatewayConfig,
        limiter: Arc<RateLimiter>,
        breakers: Arc<BreakerRegistry>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            limiter,
            breakers,
            retry: config.retry,
        })
    }

    /// The underlying HTTP client, for building requests.
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Shared per-domain rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Shared breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Execute a request on behalf of a logical source, using the default
    /// retry policy.
    pub async fn execute(&self, source: &str, request: Request) -> Result<Response> {
        self.execute_with_policy(source, request, &self.retry).await
    }

    /// Execute a request with an explicit retry policy (the document
    /// endpoints use the stricter 429 policy).
    pub async fn execute_with_policy(
        &self,
        source: &str,
        request: Request,
        policy: &RetryPolicy,
    ) -> Result<Response> {
        let breaker = self.breakers.get_or_create(source);
        if !breaker.can_execute() {
            breaker.record_rejection();
            tracing::warn!(source, "circuit open, rejecting request");
            return Err(NetError::CircuitOpen(source.to_string()));
        }

        let domain = request.url().host_str().unwrap_or_default().to_string();
        let url = request.url().to_string();
        let method = request.method().clone();

        let mut attempt: u32 = 0;

        loop {
            let Some(this_try) = request.try_clone() else {
                // Streaming bodies cannot be replayed; send once and give
                // the breaker the raw outcome.
                self.limiter.acquire(&domain).await;
                let outcome = self.client.execute(request).await;
                return match outcome {
                    Ok(resp) => Self::classify(source, &breaker, resp),
                    Err(e) => {
                        breaker.record_failure();
                        Err(NetError::Network(e))
                    }
                };
            };

            self.limiter.acquire(&domain).await;

            match self.client.execute(this_try).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    tracing::debug!(source, %method, %url, status, attempt, "response");

                    if policy.should_retry(status, attempt) {
                        let delay = policy.delay(attempt);
                        tracing::warn!(
                            source,
                            %url,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after retryable status"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Self::classify(source, &breaker, response);
                }
                Err(e) => {
                    if policy.is_retryable_error(&e) && attempt < policy.max_retries {
                        let delay = policy.delay(attempt);
                        tracing::warn!(
                            source,
                            %url,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after transport error"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    breaker.record_failure();
                    tracing::error!(source, %url, error = %e, attempts = attempt + 1, "request failed");
                    return Err(NetError::Network(e));
                }
            }
        }
    }

    /// Map a final response to the caller-facing result and notify the
    /// breaker once.
    ///
    /// Any received non-retryable response means the upstream is alive, so
    /// the breaker records a success even for 401/404; statuses that were
    /// retryable but exhausted their retries count as failures.
    fn classify(
        source: &str,
        breaker: &crate::breaker::CircuitBreaker,
        response: Response,
    ) -> Result<Response> {
        let status = response.status();

        if RetryPolicy::is_retryable_status(status.as_u16()) {
            // Still in the retryable set after the loop: retries exhausted.
            breaker.record_failure();
            tracing::error!(source, status = status.as_u16(), "retries exhausted");
            return Err(NetError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        breaker.record_success();

        if status.is_client_error() || status.is_server_error() {
            return Err(NetError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use httpmock::prelude::*;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
            jitter: false,
        }
    }

    fn gateway(policy: RetryPolicy) -> Gateway {
        Gateway::new(
            GatewayConfig {
                retry: policy,
                ..GatewayConfig::default()
            },
            Arc::new(RateLimiter::new()),
            Arc::new(BreakerRegistry::with_defaults()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_records_breaker_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ok");
                then.status(200).body("hello");
            })
            .await;

        let gw = gateway(quick_retry());
        let req = gw.client().get(server.url("/ok")).build().unwrap();
        let resp = gw.execute("src", req).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let breaker = gw.breakers().get_or_create("src");
        assert_eq!(breaker.status().successful_requests, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_on_persistent_503() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(503);
            })
            .await;

        let gw = gateway(quick_retry());
        let req = gw.client().get(server.url("/down")).build().unwrap();
        let err = gw.execute("src", req).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        // max_retries = 3 means 4 attempts in total.
        mock.assert_hits_async(4).await;

        let breaker = gw.breakers().get_or_create("src");
        assert_eq!(breaker.status().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_404_is_classified_not_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let gw = gateway(quick_retry());
        let req = gw.client().get(server.url("/missing")).build().unwrap();
        let err = gw.execute("src", req).await.unwrap_err();
        assert_eq!(err.status(), Some(404));

        // Upstream answered; that is a breaker success.
        let breaker = gw.breakers().get_or_create("src");
        assert_eq!(breaker.status().successful_requests, 1);
        assert_eq!(breaker.status().failed_requests, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_sending() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/any");
                then.status(200);
            })
            .await;

        let gw = gateway(quick_retry());
        let breaker = gw.breakers().get_or_create("src");
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let req = gw.client().get(server.url("/any")).build().unwrap();
        let err = gw.execute("src", req).await.unwrap_err();
        assert!(matches!(err, NetError::CircuitOpen(_)));
        mock.assert_hits_async(0).await;
        assert_eq!(breaker.status().rejected_requests, 1);
    }

    #[tokio::test]
    async fn test_429_with_no_retries_left_is_a_failure() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(429);
            })
            .await;

        let gw = gateway(RetryPolicy {
            max_retries: 0,
            ..quick_retry()
        });
        let req = gw.client().get(server.url("/flaky")).build().unwrap();
        let err = gw.execute("src", req).await.unwrap_err();

        assert_eq!(err.status(), Some(429));
        mock.assert_hits_async(1).await;
        let breaker = gw.breakers().get_or_create("src");
        assert_eq!(breaker.status().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_stricter_policy_applies_per_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(429);
            })
            .await;

        let gw = gateway(quick_retry());
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            exponential_base: 2.0,
            jitter: false,
        };
        let req = gw.client().get(server.url("/docs")).build().unwrap();
        let err = gw
            .execute_with_policy("docs", req, &policy)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        mock.assert_hits_async(2).await;
    }
}
