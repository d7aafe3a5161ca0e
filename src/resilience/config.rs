//! Runtime configuration for circuit breakers.

use std::time::Duration;

use crate::constants;

/// Tuning parameters for a single circuit breaker instance.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Time the circuit must stay open before a recovery probe is allowed
    pub recovery_timeout: Duration,

    /// Trial requests allowed through while half-open
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_millis(constants::DEFAULT_RECOVERY_TIMEOUT_MS),
            half_open_max_probes: constants::DEFAULT_HALF_OPEN_MAX_PROBES,
        }
    }
}
