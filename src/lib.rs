#![allow(clippy::doc_markdown)] // Allow technical terms like WebSocket, YAML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Vigil Core
//!
//! Resilience layer for real-time dashboard clients: multiplexed channel
//! subscriptions over one WebSocket, per-endpoint circuit breakers,
//! graceful degradation with cached fallbacks, and priority-tiered
//! progressive loading.
//!
//! ## Overview
//!
//! A dashboard backed by many endpoints fails in many partial ways: one
//! API degrades while others stay healthy, the real-time gateway drops and
//! must be rejoined, and a cold start fires dozens of fetches at once.
//! This crate keeps each failure contained: breakers stop hammering a
//! failing endpoint, degradation serves a last-known-good payload instead
//! of an error, the connection manager reconnects and replays channel
//! subscriptions, and the loading orchestrator brings data up critical
//! tiers first.
//!
//! ## Module Organization
//!
//! - [`realtime`] - Multiplexed channel client over one WebSocket
//! - [`resilience`] - Circuit breakers and graceful degradation
//! - [`loading`] - Priority-tiered progressive loading orchestrator
//! - [`health`] - Active endpoint health probes feeding breaker state
//! - [`storage`] - Last-known-good fallback payload store
//! - [`config`] - YAML configuration with environment overlays
//! - [`events`] - Lifecycle event publishing
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil_core::resilience::{CircuitBreakerConfig, CircuitBreakerManager, GracefulDegradation};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breakers = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default()));
//! let degradation = GracefulDegradation::new(breakers);
//!
//! degradation.register_fallback("analytics", || json!({ "cached": true }));
//!
//! let response = degradation
//!     .call("analytics", "/api/analytics", || async {
//!         Ok::<_, String>(json!({ "live": true }))
//!     })
//!     .await?;
//! println!("served from {:?}", response.source);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod health;
pub mod loading;
pub mod logging;
pub mod realtime;
pub mod resilience;
pub mod storage;

pub use config::{ConfigManager, VigilConfig};
pub use constants::events as system_events;
pub use error::{Result, VigilError};
pub use events::EventPublisher;
pub use health::{HealthConfig, HealthMonitor, HealthTarget};
pub use loading::{LoadingConfig, LoadingSnapshot, LoadingTask, ProgressiveLoader, TaskState};
pub use logging::init_structured_logging;
pub use realtime::{
    ChannelMessage, ConnectionConfig, ConnectionManager, ConnectionStatus, Subscription,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState, DataSource,
    DegradedResponse, GracefulDegradation, ServiceStatus,
};
pub use storage::{FallbackStore, MemoryStore};
