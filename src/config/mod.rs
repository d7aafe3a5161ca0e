//! # Configuration System
//!
//! YAML-based configuration with environment-specific overrides. All
//! tunables for the connection manager, circuit breakers, progressive
//! loading, and health monitoring come from `vigil-config.yaml`, with an
//! optional `vigil-config.{environment}.yaml` overlay merged on top.
//!
//! Every section and field carries a default, so a partial (or absent)
//! file yields a fully usable configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let connection = manager.config().connection.to_connection_config();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use loader::ConfigManager;

use crate::constants;
use crate::error::{Result, VigilError};
use crate::health::{HealthConfig, HealthTarget};
use crate::loading::LoadingConfig;
use crate::realtime::{ConnectionConfig, ReconnectStrategy};
use crate::resilience::CircuitBreakerConfig;

/// Root configuration structure mirroring vigil-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Real-time connection settings
    pub connection: ConnectionSettings,

    /// Circuit breaker defaults and per-endpoint overrides
    pub circuit_breakers: CircuitBreakerSettings,

    /// Progressive loading settings
    pub loading: LoadingSettings,

    /// Health monitoring settings
    pub health: HealthSettings,
}

impl VigilConfig {
    /// Check field-level constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.connection.enabled {
            let parsed = url::Url::parse(&self.connection.url).map_err(|e| {
                VigilError::Configuration(format!(
                    "connection.url '{}' is not a valid URL: {e}",
                    self.connection.url
                ))
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(VigilError::Configuration(format!(
                    "connection.url must use the ws:// or wss:// scheme, got '{}'",
                    parsed.scheme()
                )));
            }
        }
        if self.circuit_breakers.default.failure_threshold == 0 {
            return Err(VigilError::Configuration(
                "circuit_breakers.default.failure_threshold must be at least 1".to_string(),
            ));
        }
        for (endpoint, config) in &self.circuit_breakers.endpoints {
            if config.failure_threshold == 0 {
                return Err(VigilError::Configuration(format!(
                    "circuit_breakers.endpoints.'{endpoint}'.failure_threshold must be at least 1"
                )));
            }
        }
        if self.health.enabled && self.health.check_interval_ms == 0 {
            return Err(VigilError::Configuration(
                "health.check_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Real-time connection settings from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub url: String,
    pub enabled: bool,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_strategy: ReconnectStrategy,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/ws".to_string(),
            enabled: true,
            reconnect_interval_ms: constants::DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_strategy: ReconnectStrategy::Fixed,
            heartbeat_interval_ms: constants::DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: constants::DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

impl ConnectionSettings {
    /// Convert to the connection manager's runtime format
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.clone(),
            enabled: self.enabled,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_strategy: self.reconnect_strategy,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }
}

/// Circuit breaker settings from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Whether breakers gate calls at all; applied to the runtime registry
    /// via `CircuitBreakerManager::with_enabled`. When disabled every call
    /// goes straight to the live operation and no outcomes are recorded.
    pub enabled: bool,

    /// Defaults applied to endpoints without an explicit entry
    pub default: BreakerTuning,

    /// Per-endpoint overrides keyed by endpoint path
    pub endpoints: HashMap<String, BreakerTuning>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default: BreakerTuning::default(),
            endpoints: HashMap::new(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Per-endpoint overrides in the resilience module's runtime format
    pub fn endpoint_overrides(&self) -> HashMap<String, CircuitBreakerConfig> {
        self.endpoints
            .iter()
            .map(|(endpoint, tuning)| (endpoint.clone(), tuning.to_resilience_config()))
            .collect()
    }
}

/// Breaker thresholds for one endpoint (or the default) from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerTuning {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Time to wait in the open state before probing recovery
    pub recovery_timeout_ms: u64,

    /// Probe budget while half-open
    pub half_open_max_probes: u32,
}

impl Default for BreakerTuning {
    fn default() -> Self {
        Self {
            failure_threshold: constants::DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_ms: constants::DEFAULT_RECOVERY_TIMEOUT_MS,
            half_open_max_probes: constants::DEFAULT_HALF_OPEN_MAX_PROBES,
        }
    }
}

impl BreakerTuning {
    /// Convert to the resilience module's runtime format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            half_open_max_probes: self.half_open_max_probes,
        }
    }
}

/// Progressive loading settings from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadingSettings {
    pub enabled: bool,
    /// Delay inserted between priority tiers
    pub priority_delay_ms: u64,
}

impl Default for LoadingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority_delay_ms: constants::DEFAULT_PRIORITY_DELAY_MS,
        }
    }
}

impl LoadingSettings {
    /// Convert to the orchestrator's runtime format
    pub fn to_loading_config(&self) -> LoadingConfig {
        LoadingConfig {
            enabled: self.enabled,
            priority_delay: Duration::from_millis(self.priority_delay_ms),
        }
    }
}

/// Health monitoring settings from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub probe_timeout_ms: u64,
    /// Probe targets; empty means nothing to monitor
    pub targets: Vec<HealthTargetSettings>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: constants::DEFAULT_REFETCH_INTERVAL_MS,
            probe_timeout_ms: 5_000,
            targets: Vec::new(),
        }
    }
}

impl HealthSettings {
    /// Convert to the health monitor's runtime format
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig {
            enabled: self.enabled,
            check_interval: Duration::from_millis(self.check_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }

    pub fn to_targets(&self) -> Vec<HealthTarget> {
        self.targets
            .iter()
            .map(|t| HealthTarget {
                service: t.service.clone(),
                endpoint: t.endpoint.clone(),
                url: t.url.clone(),
            })
            .collect()
    }
}

/// One health probe target from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthTargetSettings {
    pub service: String,
    pub endpoint: String,
    pub url: String,
}
