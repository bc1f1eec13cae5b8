//! Exponential backoff retry policy.

use std::time::Duration;

use rand::Rng;

/// HTTP status codes worth retrying.
const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Exponential backoff with optional jitter.
///
/// Delay for attempt `k` (0-indexed) is
/// `min(base · mul^k, cap) + U(0, 0.5·delay)` when jitter is enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay.
    pub base_delay: Duration,
    /// Delay cap before jitter.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub exponential_base: f64,
    /// Whether to add uniform jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit parameters.
    pub const fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
        jitter: bool,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            exponential_base,
            jitter,
        }
    }

    /// Stricter policy for the annual-report document endpoints, where
    /// upstream 429s are unusually punitive: 5 s base, doubling, 3 retries.
    pub const fn for_document_endpoints() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Backoff delay for a given 0-indexed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let mut delay = exp.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // 0-50% of the delay, against thundering herds.
            delay += rand::thread_rng().gen_range(0.0..=0.5) * delay;
        }

        Duration::from_secs_f64(delay)
    }

    /// Whether a status code belongs to the retryable set.
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUS_CODES.contains(&status)
    }

    /// Whether a response status warrants another attempt.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_retries && Self::is_retryable_status(status)
    }

    /// Whether a transport error is transient.
    ///
    /// Connection errors, read errors and timeouts retry; everything else
    /// (TLS, redirect loops, malformed requests) propagates.
    pub fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || (err.is_request() && !err.is_builder())
    }

    /// Total attempts a logical call may make.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy {
            jitter: false,
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(10), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_half_delay() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.delay(1).as_secs_f64();
            assert!((2.0..=3.0).contains(&d), "delay {d} out of jitter bounds");
        }
    }

    #[test]
    fn test_should_retry_statuses() {
        let policy = RetryPolicy::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(policy.should_retry(status, 0));
        }
        assert!(!policy.should_retry(404, 0));
        assert!(!policy.should_retry(401, 0));
        assert!(!policy.should_retry(200, 0));
    }

    #[test]
    fn test_retry_stops_at_max() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(503, 2));
        assert!(!policy.should_retry(503, 3));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_document_endpoint_policy() {
        let policy = RetryPolicy::for_document_endpoints();
        assert_eq!(policy.delay(0), Duration::from_secs(5));
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(2), Duration::from_secs(20));
        assert_eq!(policy.max_retries, 3);
    }
}
