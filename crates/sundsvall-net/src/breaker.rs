//! Per-source circuit breakers.
//!
//! A breaker protects the engine from hammering a failing provider. When
//! consecutive failures pass the threshold, the circuit opens and requests
//! are rejected until the recovery timeout elapses; a half-open probe
//! phase then decides whether to close again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Upstream is failing; requests are rejected immediately.
    Open,
    /// Testing whether the upstream has recovered.
    HalfOpen,
}

impl CircuitState {
    /// Lower-case state name for logs and status output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct CircuitStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    stats: CircuitStats,
    last_state_change: Instant,
}

/// Observable breaker state for monitoring.
#[derive(Debug, Clone)]
pub struct CircuitStatus {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Total recorded requests, including rejections.
    pub total_requests: u64,
    /// Successfully completed requests.
    pub successful_requests: u64,
    /// Failed requests.
    pub failed_requests: u64,
    /// Requests rejected while the circuit was open.
    pub rejected_requests: u64,
    /// Current consecutive failure streak.
    pub consecutive_failures: u32,
    /// Current consecutive success streak.
    pub consecutive_successes: u32,
    /// Time spent in the current state.
    pub time_in_state: Duration,
}

/// Circuit breaker for a single upstream source.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker with explicit thresholds.
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            success_threshold,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                stats: CircuitStats::default(),
                last_state_change: Instant::now(),
            }),
        }
    }

    /// Breaker with the default thresholds: 5 failures, 60 s recovery,
    /// 2 successes to close.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, 5, Duration::from_secs(60), 2)
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a request may proceed.
    ///
    /// Performs the OPEN → HALF_OPEN transition when the recovery timeout
    /// has elapsed; otherwise has no side effects.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.recovery_timeout {
                    Self::transition(&self.name, &mut inner, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.stats.total_requests += 1;
        inner.stats.successful_requests += 1;
        inner.stats.consecutive_successes += 1;
        inner.stats.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen
            && inner.stats.consecutive_successes >= self.success_threshold
        {
            Self::transition(&self.name, &mut inner, CircuitState::Closed);
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.stats.total_requests += 1;
        inner.stats.failed_requests += 1;
        inner.stats.consecutive_failures += 1;
        inner.stats.consecutive_successes = 0;

        match inner.state {
            CircuitState::Closed => {
                if inner.stats.consecutive_failures >= self.failure_threshold {
                    Self::transition(&self.name, &mut inner, CircuitState::Open);
                }
            }
            // A single failure while probing reopens the circuit.
            CircuitState::HalfOpen => {
                Self::transition(&self.name, &mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a request rejected because the circuit was open.
    ///
    /// Rejections count toward totals but are not failures.
    pub fn record_rejection(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.stats.total_requests += 1;
        inner.stats.rejected_requests += 1;
    }

    /// Reset to closed and clear all statistics.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Closed;
        inner.stats = CircuitStats::default();
        inner.last_state_change = Instant::now();
        tracing::info!(circuit = %self.name, "circuit manually reset");
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Snapshot of the breaker for monitoring.
    pub fn status(&self) -> CircuitStatus {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        CircuitStatus {
            name: self.name.clone(),
            state: inner.state,
            total_requests: inner.stats.total_requests,
            successful_requests: inner.stats.successful_requests,
            failed_requests: inner.stats.failed_requests,
            rejected_requests: inner.stats.rejected_requests,
            consecutive_failures: inner.stats.consecutive_failures,
            consecutive_successes: inner.stats.consecutive_successes,
            time_in_state: inner.last_state_change.elapsed(),
        }
    }

    fn transition(name: &str, inner: &mut Inner, new_state: CircuitState) {
        let old_state = inner.state;
        inner.state = new_state;
        inner.last_state_change = Instant::now();

        // Streak counters restart on every state change.
        match new_state {
            CircuitState::Closed => inner.stats.consecutive_failures = 0,
            CircuitState::HalfOpen => inner.stats.consecutive_successes = 0,
            CircuitState::Open => {}
        }

        tracing::info!(
            circuit = name,
            old_state = old_state.as_str(),
            new_state = new_state.as_str(),
            "circuit transitioned"
        );
    }
}

/// Registry holding one breaker per provider name.
#[derive(Debug)]
pub struct BreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Registry creating breakers with the given thresholds.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            success_threshold,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the default thresholds.
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(60), 2)
    }

    /// Get the breaker for a source, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry lock poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.failure_threshold,
                    self.recovery_timeout,
                    self.success_threshold,
                ))
            })
            .clone()
    }

    /// Status snapshots of every known breaker.
    pub fn all_status(&self) -> Vec<CircuitStatus> {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        breakers.values().map(|b| b.status()).collect()
    }

    /// Reset every breaker.
    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}
