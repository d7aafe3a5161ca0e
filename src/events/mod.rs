//! # Event System
//!
//! Broadcast-based lifecycle events. Circuit breaker transitions, connection
//! status changes, and progressive-loading milestones are published here so
//! dashboards can observe the health of the resilience layer without
//! coupling to its internals.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
