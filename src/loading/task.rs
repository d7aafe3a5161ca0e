//! Loading task definitions and per-task state.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{PRIORITY_CRITICAL, PRIORITY_LOWEST};
use crate::error::{Result, VigilError};

/// Boxed future produced by a task's loader
pub type LoaderFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Loader function invoked each time the task runs (initial run, retry,
/// reload)
pub type Loader = Arc<dyn Fn() -> LoaderFuture + Send + Sync>;

/// State of one loading task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum TaskState {
    /// Not started; may be blocked on dependencies
    Pending,
    /// Loader in flight
    Loading,
    /// Loader finished successfully
    Complete,
    /// Loader failed; dependents stay blocked until this task is retried
    Error(String),
}

impl TaskState {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// One unit of fetchable data
#[derive(Clone)]
pub struct LoadingTask {
    pub id: String,
    /// Priority tier, 1..=5 (1 = most critical)
    pub priority: u8,
    /// Ids of tasks that must be complete before this one may start
    pub dependencies: Vec<String>,
    pub loader: Loader,
}

impl LoadingTask {
    /// Build a task from an async loader closure
    pub fn new<F, Fut>(id: impl Into<String>, priority: u8, loader: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if !(PRIORITY_CRITICAL..=PRIORITY_LOWEST).contains(&priority) {
            return Err(VigilError::Configuration(format!(
                "task priority must be {PRIORITY_CRITICAL}..={PRIORITY_LOWEST}, got {priority}"
            )));
        }
        Ok(Self {
            id: id.into(),
            priority,
            dependencies: Vec::new(),
            loader: Arc::new(move || Box::pin(loader()) as LoaderFuture),
        })
    }

    /// Declare dependencies that must complete before this task starts
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl fmt::Debug for LoadingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
