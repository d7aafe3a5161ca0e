//! # Circuit Breaker Implementation
//!
//! Per-endpoint fault isolation following the classic three-state pattern:
//! Closed (normal operation), Open (failing fast), and Half-Open (testing
//! recovery).
//!
//! `allow_request` is a fast, non-blocking decision the caller consults
//! before issuing the actual network call; the breaker never blocks a
//! request itself. Outcomes are reported back through `record_success` /
//! `record_failure`, and every state transition is published through the
//! event system for dashboards.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::events;
use crate::events::EventPublisher;
use crate::resilience::config::CircuitBreakerConfig;
use crate::resilience::metrics::CircuitBreakerMetrics;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests are allowed through
    Closed,
    /// Failure mode - requests are refused without executing
    Open,
    /// Testing recovery - a limited number of probe requests are allowed
    HalfOpen,
}

/// Point-in-time view of a breaker, derived under the state lock.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub endpoint: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Remaining time before an open circuit allows a recovery probe
    pub retry_in: Option<Duration>,
}

/// Mutable breaker state. Held behind a sync mutex that is never kept across
/// a suspension point, so every transition is a single synchronous block.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_probes: u32,
    next_retry_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    metrics: CircuitBreakerMetrics,
}

/// Per-endpoint circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Endpoint identifier for logging, metrics, and events
    endpoint: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    events: EventPublisher,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given endpoint
    pub fn new(endpoint: String, config: CircuitBreakerConfig) -> Self {
        Self::with_events(endpoint, config, EventPublisher::default())
    }

    /// Create a breaker that publishes transitions on a shared event channel
    pub fn with_events(
        endpoint: String,
        config: CircuitBreakerConfig,
        events: EventPublisher,
    ) -> Self {
        info!(
            endpoint = %endpoint,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            half_open_max_probes = config.half_open_max_probes,
            "Circuit breaker initialized"
        );

        Self {
            endpoint,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_probes: 0,
                next_retry_at: None,
                last_failure_at: None,
                metrics: CircuitBreakerMetrics::new(),
            }),
            events,
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Endpoint this breaker guards
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fast, non-blocking gate consulted before issuing a request.
    ///
    /// While open, returns `false` until the recovery timeout elapses, at
    /// which point the breaker moves to half-open and admits exactly
    /// `half_open_max_probes` probe requests.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let due = inner
                    .next_retry_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if due {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_probes = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes < self.config.half_open_max_probes {
                    inner.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request outcome
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.record_success();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                debug!(endpoint = %self.endpoint, "Recovery probe succeeded");
                inner.consecutive_failures = 0;
                inner.half_open_probes = 0;
                inner.next_retry_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {
                // A success report while open means the caller bypassed the
                // gate; log it, but do not transition.
                warn!(endpoint = %self.endpoint, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed request outcome
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.record_failure();
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.next_retry_at = Some(Instant::now() + self.config.recovery_timeout);
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // A failed probe reopens the circuit with a fresh timeout.
                inner.half_open_probes = 0;
                inner.next_retry_at = Some(Instant::now() + self.config.recovery_timeout);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                // No-op while open; the failure counter does not grow.
            }
        }
    }

    /// Reset the breaker to closed, clearing all failure accounting
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.half_open_probes = 0;
        inner.next_retry_at = None;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
        info!(endpoint = %self.endpoint, "Circuit breaker reset manually");
    }

    /// Point-in-time view of the breaker for dashboards
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            retry_in: inner
                .next_retry_at
                .map(|at| at.saturating_duration_since(Instant::now())),
        }
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Single transition point. Callers hold the lock; the transition is
    /// logged and published before the lock is released.
    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.metrics.record_transition();

        let event_name = match to {
            CircuitState::Open => events::CIRCUIT_OPENED,
            CircuitState::HalfOpen => events::CIRCUIT_HALF_OPENED,
            CircuitState::Closed => events::CIRCUIT_CLOSED,
        };

        match to {
            CircuitState::Open => warn!(
                endpoint = %self.endpoint,
                consecutive_failures = inner.consecutive_failures,
                failure_threshold = self.config.failure_threshold,
                "Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => info!(
                endpoint = %self.endpoint,
                max_probes = self.config.half_open_max_probes,
                "Circuit breaker half-open (testing recovery)"
            ),
            CircuitState::Closed => info!(
                endpoint = %self.endpoint,
                "Circuit breaker closed (recovered)"
            ),
        }

        self.events.publish(
            event_name,
            json!({
                "endpoint": self.endpoint,
                "from": from,
                "to": to,
                "consecutive_failures": inner.consecutive_failures,
            }),
        );
    }
}
