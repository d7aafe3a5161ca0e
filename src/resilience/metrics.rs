//! Call accounting for circuit breakers.
//!
//! Tracked per breaker and exposed through snapshots so dashboards can show
//! failure rates alongside circuit state.

use serde::Serialize;

/// Counters for a single circuit breaker
#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Total outcomes reported
    pub total_calls: u64,
    /// Successful outcomes reported
    pub success_count: u64,
    /// Failed outcomes reported
    pub failure_count: u64,
    /// State transitions since creation
    pub state_transitions: u64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.success_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failure_count += 1;
    }

    pub fn record_transition(&mut self) {
        self.state_transitions += 1;
    }

    /// Fraction of reported outcomes that failed, 0.0 when nothing reported
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failure_count as f64 / self.total_calls as f64
    }
}
