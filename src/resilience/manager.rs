//! # Circuit Breaker Manager
//!
//! Lazy per-endpoint breaker registry. Breakers are created on first use,
//! keyed by endpoint name, and live for the lifetime of the manager. The
//! manager is an explicit, constructed object with injectable configuration
//! so isolated tests and multiple independent instances are possible.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::events::EventPublisher;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot};
use crate::resilience::config::CircuitBreakerConfig;

/// Registry of per-endpoint circuit breakers
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    /// Per-endpoint overrides, falling back to the default config
    endpoint_configs: HashMap<String, CircuitBreakerConfig>,
    /// When false, callers bypass breaker gating entirely
    enabled: bool,
    events: EventPublisher,
}

impl CircuitBreakerManager {
    /// Create a manager where every endpoint uses the default configuration
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self::with_overrides(default_config, HashMap::new(), EventPublisher::default())
    }

    /// Create a manager with per-endpoint configuration overrides and a
    /// shared event channel for transition observability
    pub fn with_overrides(
        default_config: CircuitBreakerConfig,
        endpoint_configs: HashMap<String, CircuitBreakerConfig>,
        events: EventPublisher,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            endpoint_configs,
            enabled: true,
            events,
        }
    }

    /// Toggle breaker gating. A disabled manager's callers send every
    /// request straight to the live operation and record no outcomes;
    /// this is how the `circuit_breakers.enabled` config setting lands.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether breakers gate calls at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get or lazily create the breaker for an endpoint
    pub fn breaker_for(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Arc::clone(&existing);
        }

        let config = self.config_for_endpoint(endpoint);
        debug!(endpoint = %endpoint, "Creating circuit breaker on first use");
        let breaker = Arc::new(CircuitBreaker::with_events(
            endpoint.to_string(),
            config,
            self.events.clone(),
        ));

        // Another caller may have raced the insert; keep whichever won.
        self.breakers
            .entry(endpoint.to_string())
            .or_insert(breaker)
            .clone()
    }

    /// The breaker for an endpoint, if one has already been created.
    ///
    /// Unlike [`CircuitBreakerManager::breaker_for`] this never creates a
    /// breaker, so read paths (status queries, dashboards) do not grow the
    /// registry.
    pub fn peek(&self, endpoint: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(endpoint).map(|entry| Arc::clone(&entry))
    }

    /// Resolve the configuration for an endpoint (override or default)
    pub fn config_for_endpoint(&self, endpoint: &str) -> CircuitBreakerConfig {
        self.endpoint_configs
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Snapshots of every breaker created so far, for dashboards
    pub fn snapshot_all(&self) -> Vec<CircuitSnapshot> {
        self.breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    /// Number of breakers created so far
    pub fn breaker_count(&self) -> usize {
        self.breakers.len()
    }

    /// Event channel shared by all breakers in this manager
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }
}
