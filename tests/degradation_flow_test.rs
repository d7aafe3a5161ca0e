//! Integration tests for circuit breaking and graceful degradation working
//! together across endpoint failures and recovery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use vigil_core::resilience::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitState, DataSource, GracefulDegradation,
};
use vigil_core::storage::{FallbackStore, MemoryStore};
use vigil_core::VigilError;

fn fast_breakers(failure_threshold: u32, recovery_timeout: Duration) -> Arc<CircuitBreakerManager> {
    Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout,
        half_open_max_probes: 1,
    }))
}

#[tokio::test]
async fn test_open_circuit_short_circuits_to_fallback() {
    let degradation = GracefulDegradation::new(fast_breakers(2, Duration::from_secs(60)));
    degradation.register_fallback("analytics", || json!({ "cached": true }));

    // Trip the breaker.
    for _ in 0..2 {
        let response = degradation
            .call("analytics", "/api/analytics", || async {
                Err::<serde_json::Value, _>("upstream 500")
            })
            .await
            .expect("fallback substitutes the failure");
        assert_eq!(response.source, DataSource::Fallback);
    }
    assert_eq!(
        degradation.breakers().breaker_for("/api/analytics").state(),
        CircuitState::Open
    );

    // With the circuit open the operation must never run.
    let invoked = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invoked);
    let response = degradation
        .call("analytics", "/api/analytics", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({ "live": true }))
            }
        })
        .await
        .expect("fallback while open");

    assert_eq!(response.source, DataSource::Fallback);
    assert_eq!(response.data["cached"], true);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_open_circuit_without_fallback_fails_fast() {
    let degradation = GracefulDegradation::new(fast_breakers(1, Duration::from_secs(60)));

    let first = degradation
        .call("reports", "/api/reports", || async {
            Err::<serde_json::Value, _>("timeout")
        })
        .await;
    assert!(matches!(first, Err(VigilError::EndpointFailure { .. })));

    // Breaker is open now; the error is a typed unavailability, returned
    // immediately rather than after another doomed request.
    let second = degradation
        .call("reports", "/api/reports", || async {
            Ok::<_, String>(json!(null))
        })
        .await;
    match second {
        Err(VigilError::ServiceUnavailable { service }) => assert_eq!(service, "reports"),
        other => panic!("expected ServiceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_recovery_closes_after_successful_probe() {
    let degradation = GracefulDegradation::new(fast_breakers(1, Duration::from_millis(30)));

    let _ = degradation
        .call("rates", "/api/rates", || async {
            Err::<serde_json::Value, _>("boom")
        })
        .await;
    let breaker = degradation.breakers().breaker_for("/api/rates");
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(50)).await;

    // First call after the recovery timeout is the half-open probe.
    let response = degradation
        .call("rates", "/api/rates", || async {
            Ok::<_, String>(json!({ "eur": 1.1 }))
        })
        .await
        .expect("probe succeeds");
    assert_eq!(response.source, DataSource::Live);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_failing_endpoint_does_not_affect_siblings() {
    let degradation = GracefulDegradation::new(fast_breakers(1, Duration::from_secs(60)));

    let _ = degradation
        .call("analytics", "/api/analytics", || async {
            Err::<serde_json::Value, _>("down")
        })
        .await;

    let response = degradation
        .call("rates", "/api/rates", || async {
            Ok::<_, String>(json!({ "eur": 1.1 }))
        })
        .await
        .expect("healthy endpoint unaffected");
    assert_eq!(response.source, DataSource::Live);

    let breakers = degradation.breakers();
    assert_eq!(
        breakers.breaker_for("/api/analytics").state(),
        CircuitState::Open
    );
    assert_eq!(
        breakers.breaker_for("/api/rates").state(),
        CircuitState::Closed
    );
}

#[tokio::test]
async fn test_store_backed_fallback_serves_last_known_good() {
    let degradation = GracefulDegradation::new(fast_breakers(1, Duration::from_secs(60)));
    let store = Arc::new(MemoryStore::new());

    let provider_store = Arc::clone(&store);
    degradation.register_fallback("kpis", move || {
        provider_store
            .get("kpis")
            .unwrap_or_else(|| json!({ "placeholder": true }))
    });

    // A live success caches its payload as the last known good.
    let response = degradation
        .call("kpis", "/api/kpis", || async {
            Ok::<_, String>(json!({ "total": 42 }))
        })
        .await
        .expect("live call");
    assert_eq!(response.source, DataSource::Live);
    store.set("kpis", response.data.clone());

    // Endpoint dies; the cached payload is served instead of an error.
    let degraded = degradation
        .call("kpis", "/api/kpis", || async {
            Err::<serde_json::Value, _>("connection refused")
        })
        .await
        .expect("fallback substitutes");
    assert_eq!(degraded.source, DataSource::Fallback);
    assert_eq!(degraded.data["total"], 42);
}

#[tokio::test]
async fn test_service_status_reflects_breaker_and_fallback() {
    let degradation = GracefulDegradation::new(fast_breakers(1, Duration::from_secs(60)));
    degradation.register_fallback("analytics", || json!(null));

    let _ = degradation
        .call("analytics", "/api/analytics", || async {
            Err::<serde_json::Value, _>("down")
        })
        .await;
    let _ = degradation
        .call("rates", "/api/rates", || async {
            Ok::<_, String>(json!(null))
        })
        .await;

    let statuses = degradation.all_service_statuses();
    assert_eq!(statuses.len(), 2);

    let analytics = statuses.iter().find(|s| s.service == "analytics").unwrap();
    assert!(!analytics.available);
    assert_eq!(analytics.circuit_state, CircuitState::Open);
    assert!(analytics.fallback_available);

    let rates = statuses.iter().find(|s| s.service == "rates").unwrap();
    assert!(rates.available);
    assert!(!rates.fallback_available);
}
