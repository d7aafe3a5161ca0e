//! # Structured Error Handling
//!
//! Crate-wide error taxonomy. Failures are recovered as close to their source
//! as possible: the circuit breaker absorbs endpoint failures, the connection
//! manager absorbs transport failures via reconnection, and errors only
//! escalate to the caller when no recovery or fallback path exists.

use thiserror::Error;

/// Errors surfaced by the resilience core.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Connection-level failure (socket closed unexpectedly, handshake
    /// failure, heartbeat timeout). Triggers reconnect scheduling; surfaced
    /// through `ConnectionManager::last_error` only once the reconnect
    /// budget is spent, never as a loading-task failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single request to an endpoint failed. Recorded on that endpoint's
    /// circuit breaker; not propagated past the degradation registry when a
    /// fallback is registered.
    #[error("Endpoint '{endpoint}' failed: {message}")]
    EndpointFailure { endpoint: String, message: String },

    /// The circuit for a service is open and no fallback is registered.
    #[error("Service '{service}' unavailable: circuit open and no fallback registered")]
    ServiceUnavailable { service: String },

    /// A loading task's operation failed. Isolated to that task's state;
    /// never propagated to sibling tasks or the orchestrator's overall run.
    #[error("Loading task '{task_id}' failed: {message}")]
    TaskError { task_id: String, message: String },

    /// Configuration load or validation failure.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VigilError {
    /// Build an endpoint failure from any displayable error source.
    pub fn endpoint_failure(endpoint: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::EndpointFailure {
            endpoint: endpoint.into(),
            message: source.to_string(),
        }
    }

    /// Build a task error from any displayable error source.
    pub fn task_error(task_id: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::TaskError {
            task_id: task_id.into(),
            message: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
