//! # Health Monitoring
//!
//! Periodically probes service health endpoints and feeds the results into
//! the circuit breaker manager. A probe that returns a success status
//! records a success on the endpoint's breaker (driving recovery once the
//! breaker is half-open); any other outcome records a failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_REFETCH_INTERVAL_MS;
use crate::resilience::CircuitBreakerManager;

/// One service health probe target
#[derive(Debug, Clone)]
pub struct HealthTarget {
    /// Service name reported in degradation status
    pub service: String,
    /// Breaker endpoint key the probe result is recorded against
    pub endpoint: String,
    /// Absolute URL probed with a GET request
    pub url: String,
}

/// Tuning for the health monitor
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Interval between probe rounds
    pub check_interval: Duration,
    /// Per-probe request timeout
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_millis(DEFAULT_REFETCH_INTERVAL_MS),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Active health prober feeding circuit breaker state
pub struct HealthMonitor {
    breakers: Arc<CircuitBreakerManager>,
    targets: Vec<HealthTarget>,
    config: HealthConfig,
    client: reqwest::Client,
}

impl HealthMonitor {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        targets: Vec<HealthTarget>,
        config: HealthConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .unwrap_or_default();

        Self {
            breakers,
            targets,
            config,
            client,
        }
    }

    /// Probe every target on an interval until the shutdown signal flips.
    ///
    /// The first round runs immediately; breaker state is current from
    /// startup rather than one interval later.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Health monitoring disabled");
            return;
        }

        info!(
            targets = self.targets.len(),
            interval_ms = self.config.check_interval.as_millis() as u64,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_now().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every target once, recording outcomes on the breakers.
    ///
    /// Probes exist only to feed breaker state; with breaker gating
    /// disabled there is nothing to record.
    pub async fn check_now(&self) {
        if !self.breakers.is_enabled() {
            return;
        }
        for target in &self.targets {
            let healthy = self.probe(target).await;
            let breaker = self.breakers.breaker_for(&target.endpoint);
            if healthy {
                debug!(service = %target.service, "Health probe succeeded");
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }

    async fn probe(&self, target: &HealthTarget) -> bool {
        match self.client.get(&target.url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                if !healthy {
                    warn!(
                        service = %target.service,
                        status = %response.status(),
                        "Health probe returned non-success status"
                    );
                }
                healthy
            }
            Err(e) => {
                warn!(service = %target.service, error = %e, "Health probe failed");
                false
            }
        }
    }

    pub fn targets(&self) -> &[HealthTarget] {
        &self.targets
    }
}
