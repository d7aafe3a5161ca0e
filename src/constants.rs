//! # System Constants
//!
//! Core constants that define the operational boundaries of the resilience
//! layer: default tuning values for circuit breaking, reconnection,
//! heartbeats, and progressive loading, plus the lifecycle event names
//! published through the event system.

/// Lifecycle events published through [`crate::events::EventPublisher`]
pub mod events {
    // Circuit breaker transitions
    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    pub const CIRCUIT_HALF_OPENED: &str = "circuit.half_opened";
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";

    // Connection lifecycle
    pub const CONNECTION_CONNECTING: &str = "connection.connecting";
    pub const CONNECTION_OPEN: &str = "connection.open";
    pub const CONNECTION_RECONNECTING: &str = "connection.reconnecting";
    pub const CONNECTION_CLOSED: &str = "connection.closed";
    pub const CONNECTION_ERROR: &str = "connection.error";

    // Progressive loading milestones
    pub const LOADING_TASK_STARTED: &str = "loading.task_started";
    pub const LOADING_TASK_COMPLETED: &str = "loading.task_completed";
    pub const LOADING_TASK_FAILED: &str = "loading.task_failed";
    pub const LOADING_CRITICAL_COMPLETE: &str = "loading.critical_complete";
    pub const LOADING_ALL_COMPLETE: &str = "loading.all_complete";
}

/// Consecutive failures before a circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time a circuit stays open before probing recovery, in milliseconds
pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 30_000;

/// Trial requests allowed while a circuit is half-open
pub const DEFAULT_HALF_OPEN_MAX_PROBES: u32 = 1;

/// Delay between reconnect attempts, in milliseconds
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Reconnect attempts before surfacing a terminal connection error
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Upper bound on the jittered exponential reconnect delay, in milliseconds
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Interval between heartbeat pings, in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Grace window for a pong reply before the connection is declared dead,
/// in milliseconds
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Delay between progressive-loading priority tiers, in milliseconds
pub const DEFAULT_PRIORITY_DELAY_MS: u64 = 100;

/// Interval between periodic health probes, in milliseconds
pub const DEFAULT_REFETCH_INTERVAL_MS: u64 = 30_000;

/// Most critical loading priority tier
pub const PRIORITY_CRITICAL: u8 = 1;

/// Lowest loading priority tier
pub const PRIORITY_LOWEST: u8 = 5;

/// Maximum age of a cached fallback entry, in seconds (24 hours)
pub const DEFAULT_FALLBACK_MAX_AGE_SECS: u64 = 24 * 60 * 60;
