//! # Graceful Degradation Registry
//!
//! Wraps endpoint calls with circuit breaker protection and substitutes
//! registered fallback values when the live path is unhealthy. An upstream
//! outage degrades to stale/default data instead of cascading failures or
//! hanging requests, and recovery is probed automatically.
//!
//! This registry is the only writer of breaker transitions: callers report
//! outcomes through [`GracefulDegradation::call`], they never set breaker
//! state directly.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, VigilError};
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::manager::CircuitBreakerManager;

/// Provider invoked to produce a fallback value when the live path is down
pub type FallbackProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Where a response's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh data from the live endpoint
    Live,
    /// Registered fallback value; the UI should show an offline or
    /// recovering indicator
    Fallback,
}

/// Result of a degradation-protected call
#[derive(Debug, Clone, Serialize)]
pub struct DegradedResponse {
    pub data: Value,
    pub source: DataSource,
}

/// Degradation view of a logical service. Derived entirely from the
/// associated circuit breaker; never mutated directly.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub available: bool,
    pub circuit_state: CircuitState,
    pub fallback_available: bool,
    pub last_checked: DateTime<Utc>,
}

/// Registry wrapping calls with per-endpoint breakers and fallback providers
pub struct GracefulDegradation {
    breakers: Arc<CircuitBreakerManager>,
    fallbacks: DashMap<String, FallbackProvider>,
    /// Last endpoint each service was called through, for status derivation
    service_endpoints: DashMap<String, String>,
}

impl GracefulDegradation {
    pub fn new(breakers: Arc<CircuitBreakerManager>) -> Self {
        Self {
            breakers,
            fallbacks: DashMap::new(),
            service_endpoints: DashMap::new(),
        }
    }

    /// Register a fallback provider for a service
    pub fn register_fallback<F>(&self, service: impl Into<String>, provider: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.fallbacks.insert(service.into(), Arc::new(provider));
    }

    /// Whether a fallback is registered for the service
    pub fn has_fallback(&self, service: &str) -> bool {
        self.fallbacks.contains_key(service)
    }

    /// Execute `operation` for `service` through `endpoint`'s breaker.
    ///
    /// If the breaker refuses the request, the registered fallback is
    /// returned immediately, or [`VigilError::ServiceUnavailable`] when none
    /// is registered. If the operation runs and fails, the failure is
    /// recorded and the fallback substituted the same way; without a
    /// fallback the endpoint failure propagates to the caller.
    pub async fn call<F, Fut, E>(
        &self,
        service: &str,
        endpoint: &str,
        operation: F,
    ) -> Result<DegradedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: std::fmt::Display,
    {
        self.service_endpoints
            .insert(service.to_string(), endpoint.to_string());

        // With breakers disabled by configuration, every call goes straight
        // to the live operation and no outcomes are recorded.
        let breaker = self
            .breakers
            .is_enabled()
            .then(|| self.breakers.breaker_for(endpoint));

        if let Some(breaker) = &breaker {
            if !breaker.allow_request() {
                debug!(
                    service = %service,
                    endpoint = %endpoint,
                    "Circuit open, skipping request"
                );
                return self.fallback_or(service, VigilError::ServiceUnavailable {
                    service: service.to_string(),
                });
            }
        }

        match operation().await {
            Ok(data) => {
                if let Some(breaker) = &breaker {
                    breaker.record_success();
                }
                Ok(DegradedResponse {
                    data,
                    source: DataSource::Live,
                })
            }
            Err(e) => {
                if let Some(breaker) = &breaker {
                    breaker.record_failure();
                }
                warn!(
                    service = %service,
                    endpoint = %endpoint,
                    error = %e,
                    "Endpoint call failed, attempting fallback"
                );
                self.fallback_or(service, VigilError::endpoint_failure(endpoint, e))
            }
        }
    }

    /// Degradation view of a logical service.
    ///
    /// A read-only query: a service that has never been called through this
    /// registry reports a closed circuit without creating a breaker.
    pub fn service_status(&self, service: &str) -> ServiceStatus {
        let state = self
            .service_endpoints
            .get(service)
            .and_then(|endpoint| self.breakers.peek(endpoint.value()))
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed);

        ServiceStatus {
            service: service.to_string(),
            available: matches!(state, CircuitState::Closed | CircuitState::HalfOpen),
            circuit_state: state,
            fallback_available: self.has_fallback(service),
            last_checked: Utc::now(),
        }
    }

    /// Statuses for every service seen by this registry
    pub fn all_service_statuses(&self) -> Vec<ServiceStatus> {
        let mut names: Vec<String> = self
            .service_endpoints
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for entry in self.fallbacks.iter() {
            if !names.contains(entry.key()) {
                names.push(entry.key().clone());
            }
        }
        names.sort();
        names.iter().map(|s| self.service_status(s)).collect()
    }

    /// The breaker manager backing this registry
    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    fn fallback_or(&self, service: &str, otherwise: VigilError) -> Result<DegradedResponse> {
        match self.fallbacks.get(service) {
            Some(provider) => Ok(DegradedResponse {
                data: (provider.value())(),
                source: DataSource::Fallback,
            }),
            None => Err(otherwise),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::config::CircuitBreakerConfig;
    use serde_json::json;
    use std::time::Duration;

    fn registry(threshold: u32) -> GracefulDegradation {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        });
        GracefulDegradation::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_live_path_records_success() {
        let registry = registry(3);
        let response = registry
            .call("pricing", "/pricing", || async {
                Ok::<_, String>(json!({ "rate": 7.25 }))
            })
            .await
            .expect("live call succeeds");

        assert_eq!(response.source, DataSource::Live);
        assert_eq!(response.data["rate"], 7.25);
        let status = registry.service_status("pricing");
        assert!(status.available);
        assert_eq!(status.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failure_with_fallback_substitutes() {
        let registry = registry(3);
        registry.register_fallback("pricing", || json!({ "rate": 7.0, "stale": true }));

        let response = registry
            .call("pricing", "/pricing", || async {
                Err::<Value, _>("upstream 503")
            })
            .await
            .expect("fallback substitutes the failure");

        assert_eq!(response.source, DataSource::Fallback);
        assert_eq!(response.data["stale"], true);
    }

    #[tokio::test]
    async fn test_failure_without_fallback_propagates() {
        let registry = registry(3);
        let result = registry
            .call("pricing", "/pricing", || async {
                Err::<Value, _>("upstream 503")
            })
            .await;

        assert!(matches!(
            result,
            Err(VigilError::EndpointFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_circuit_without_fallback_is_service_unavailable() {
        let registry = registry(1);
        let _ = registry
            .call("pricing", "/pricing", || async {
                Err::<Value, _>("boom")
            })
            .await;

        // Circuit is now open; the operation must not run and the call must
        // not hang.
        let executed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        let result = registry
            .call("pricing", "/pricing", move || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>(json!(null))
            })
            .await;

        assert!(!executed.load(std::sync::atomic::Ordering::SeqCst));
        match result {
            Err(VigilError::ServiceUnavailable { service }) => assert_eq!(service, "pricing"),
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_circuit_with_fallback_short_circuits() {
        let registry = registry(1);
        registry.register_fallback("pricing", || json!({ "cached": true }));
        let _ = registry
            .call("pricing", "/pricing", || async {
                Err::<Value, _>("boom")
            })
            .await;

        let executed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        let response = registry
            .call("pricing", "/pricing", move || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>(json!(null))
            })
            .await
            .expect("fallback while open");

        assert!(!executed.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(response.source, DataSource::Fallback);
        let status = registry.service_status("pricing");
        assert!(!status.available);
        assert!(status.fallback_available);
    }

    #[tokio::test]
    async fn test_disabled_breakers_never_gate() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_probes: 1,
        })
        .with_enabled(false);
        let registry = GracefulDegradation::new(Arc::new(manager));

        // Failures past the threshold would open a breaker; with gating off
        // every call still reaches the live operation.
        for _ in 0..3 {
            let result = registry
                .call("pricing", "/pricing", || async {
                    Err::<Value, _>("upstream 503")
                })
                .await;
            assert!(matches!(result, Err(VigilError::EndpointFailure { .. })));
        }

        let response = registry
            .call("pricing", "/pricing", || async {
                Ok::<_, String>(json!({ "rate": 7.25 }))
            })
            .await
            .expect("live call runs despite prior failures");
        assert_eq!(response.source, DataSource::Live);

        // No outcomes recorded means no breakers created.
        assert_eq!(registry.breakers().breaker_count(), 0);
    }

    #[tokio::test]
    async fn test_status_query_does_not_create_breakers() {
        let registry = registry(3);
        let status = registry.service_status("never-called");

        assert!(status.available);
        assert_eq!(status.circuit_state, CircuitState::Closed);
        assert_eq!(registry.breakers().breaker_count(), 0);
    }

    #[tokio::test]
    async fn test_all_service_statuses() {
        let registry = registry(3);
        registry.register_fallback("rules", || json!([]));
        let _ = registry
            .call("pricing", "/pricing", || async {
                Ok::<_, String>(json!({}))
            })
            .await;

        let statuses = registry.all_service_statuses();
        let names: Vec<_> = statuses.iter().map(|s| s.service.as_str()).collect();
        assert_eq!(names, vec!["pricing", "rules"]);
    }
}
