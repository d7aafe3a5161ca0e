//! # Resilience Module
//!
//! Fault isolation and graceful degradation for the dashboard's data paths.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: per-endpoint failure/success state machines that
//!   stop issuing requests to consistently failing endpoints
//! - **Manager**: lazy per-endpoint breaker registry with configuration
//!   overrides
//! - **Degradation Registry**: wraps endpoint calls with breaker protection
//!   and substitutes registered fallback values when the live path is
//!   unhealthy
//! - **Metrics**: call/failure accounting for dashboards
//!
//! ## Usage
//!
//! ```rust
//! use vigil_core::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     recovery_timeout: Duration::from_secs(30),
//!     half_open_max_probes: 1,
//! };
//!
//! let breaker = CircuitBreaker::new("pricing-api".to_string(), config);
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! assert!(breaker.allow_request());
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod degradation;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::CircuitBreakerConfig;
pub use degradation::{DataSource, DegradedResponse, GracefulDegradation, ServiceStatus};
pub use manager::CircuitBreakerManager;
pub use metrics::CircuitBreakerMetrics;
