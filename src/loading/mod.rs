//! # Progressive Loading
//!
//! Priority-tiered orchestration of independent data-fetch tasks.
//!
//! Tasks are partitioned into priority tiers 1..=5 (1 = most critical) and
//! executed tier by tier: tasks within a tier run concurrently once their
//! dependencies are complete, and the next tier never starts before the
//! current tier settles. A configurable inter-tier delay keeps a burst of
//! simultaneous requests from saturating the network.

pub mod orchestrator;
pub mod task;

pub use orchestrator::{LoadingConfig, LoadingSnapshot, ProgressiveLoader};
pub use task::{LoadingTask, TaskState};
