//! # Progressive Loading Orchestrator
//!
//! Executes a set of loading tasks in priority tiers, honoring the task
//! dependency graph. Task failures are isolated: an error is recorded on
//! that task only, sibling tasks keep running, and dependents of a failed
//! task stay blocked until the caller retries the failed id via
//! [`ProgressiveLoader::load_task`].

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{self, events, PRIORITY_CRITICAL, PRIORITY_LOWEST};
use crate::error::{Result, VigilError};
use crate::events::EventPublisher;
use crate::loading::task::{LoadingTask, TaskState};

/// Tuning for the orchestrator
#[derive(Debug, Clone)]
pub struct LoadingConfig {
    /// Whether progressive loading runs at all
    pub enabled: bool,
    /// Delay inserted between priority tiers to avoid saturating the
    /// network with a burst of simultaneous requests
    pub priority_delay: Duration,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority_delay: Duration::from_millis(constants::DEFAULT_PRIORITY_DELAY_MS),
        }
    }
}

/// Observable progress of one orchestration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadingSnapshot {
    /// 0..=100
    pub progress: u8,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// All priority-1 tasks complete
    pub is_critical_loaded: bool,
    /// Every task complete, failed, or permanently blocked
    pub is_all_loaded: bool,
    pub task_states: HashMap<String, TaskState>,
}

/// Priority-tiered loading orchestrator
pub struct ProgressiveLoader {
    tasks: Vec<LoadingTask>,
    states: Mutex<HashMap<String, TaskState>>,
    config: LoadingConfig,
    snapshot_tx: watch::Sender<LoadingSnapshot>,
    events: EventPublisher,
    milestones: Mutex<Milestones>,
}

#[derive(Default)]
struct Milestones {
    critical_announced: bool,
    all_announced: bool,
}

impl ProgressiveLoader {
    /// Build an orchestrator over the given tasks.
    ///
    /// Validates that task ids are unique and every dependency references a
    /// known task.
    pub fn new(tasks: Vec<LoadingTask>, config: LoadingConfig) -> Result<Self> {
        Self::with_events(tasks, config, EventPublisher::default())
    }

    pub fn with_events(
        tasks: Vec<LoadingTask>,
        config: LoadingConfig,
        events: EventPublisher,
    ) -> Result<Self> {
        let mut states = HashMap::new();
        for task in &tasks {
            if states.insert(task.id.clone(), TaskState::Pending).is_some() {
                return Err(VigilError::Configuration(format!(
                    "duplicate loading task id '{}'",
                    task.id
                )));
            }
        }
        for task in &tasks {
            for dep in &task.dependencies {
                if !states.contains_key(dep) {
                    return Err(VigilError::Configuration(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id
                    )));
                }
            }
        }

        let (snapshot_tx, _) = watch::channel(LoadingSnapshot::default());
        let loader = Self {
            tasks,
            states: Mutex::new(states),
            config,
            snapshot_tx,
            events,
            milestones: Mutex::new(Milestones::default()),
        };
        loader.publish_snapshot();
        Ok(loader)
    }

    /// Execute all tasks tier by tier. Returns the final snapshot.
    ///
    /// Within a tier, tasks whose dependencies are complete run
    /// concurrently; the next tier starts only after the current tier
    /// settles. Tasks left blocked by a failed or later-tier dependency get
    /// a final sweep after the last tier, so a completable task is never
    /// stranded by tier ordering alone.
    pub async fn run(&self) -> LoadingSnapshot {
        if !self.config.enabled {
            debug!("Progressive loading disabled by configuration");
            return self.snapshot();
        }

        for tier in PRIORITY_CRITICAL..=PRIORITY_LOWEST {
            let tier_has_tasks = self.tasks.iter().any(|t| t.priority == tier);
            if !tier_has_tasks {
                continue;
            }

            debug!(tier = tier, "Starting priority tier");
            self.drain_ready(Some(tier)).await;

            let later_tiers_pending = self.tasks.iter().any(|t| t.priority > tier);
            if later_tiers_pending {
                sleep(self.config.priority_delay).await;
            }
        }

        // Tasks blocked on a later tier's dependency become runnable only
        // now that every tier has settled.
        self.drain_ready(None).await;

        let snapshot = self.snapshot();
        info!(
            progress = snapshot.progress,
            completed = snapshot.completed_tasks,
            total = snapshot.total_tasks,
            "Progressive loading run finished"
        );
        snapshot
    }

    /// Manually run (or retry) a single task by id.
    ///
    /// Fails with a typed error when the id is unknown or the task's
    /// dependencies are not complete; retrying a failed dependency first is
    /// the caller's explicit decision.
    pub async fn load_task(&self, id: &str) -> Result<()> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| VigilError::task_error(id, "unknown task id"))?;

        let unmet: Vec<&String> = {
            let states = self.states.lock();
            task.dependencies
                .iter()
                .filter(|dep| !states.get(*dep).map(TaskState::is_complete).unwrap_or(false))
                .collect()
        };
        if !unmet.is_empty() {
            return Err(VigilError::task_error(
                id,
                format!("dependencies not complete: {unmet:?}"),
            ));
        }

        self.execute(task).await;
        match self.state_of(id) {
            Some(TaskState::Error(message)) => Err(VigilError::TaskError {
                task_id: id.to_string(),
                message,
            }),
            _ => Ok(()),
        }
    }

    /// Reset every task to pending and run again
    pub async fn reload(&self) -> LoadingSnapshot {
        {
            let mut states = self.states.lock();
            for state in states.values_mut() {
                *state = TaskState::Pending;
            }
            *self.milestones.lock() = Milestones::default();
        }
        self.publish_snapshot();
        self.run().await
    }

    /// Current state of one task
    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.states.lock().get(id).cloned()
    }

    /// Point-in-time progress view
    pub fn snapshot(&self) -> LoadingSnapshot {
        let states = self.states.lock();
        self.snapshot_locked(&states)
    }

    /// Watch progress changes
    pub fn watch(&self) -> watch::Receiver<LoadingSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run every ready task, repeatedly, until nothing more is ready.
    /// `tier` restricts execution to one priority tier; `None` considers
    /// every task (final sweep).
    async fn drain_ready(&self, tier: Option<u8>) {
        loop {
            let ready: Vec<&LoadingTask> = {
                let states = self.states.lock();
                self.tasks
                    .iter()
                    .filter(|t| tier.map(|p| t.priority == p).unwrap_or(true))
                    .filter(|t| states.get(&t.id) == Some(&TaskState::Pending))
                    .filter(|t| {
                        t.dependencies.iter().all(|dep| {
                            states.get(dep).map(TaskState::is_complete).unwrap_or(false)
                        })
                    })
                    .collect()
            };

            if ready.is_empty() {
                break;
            }

            join_all(ready.into_iter().map(|task| self.execute(task))).await;
        }
    }

    /// Run one task's loader and record the outcome. State changes are
    /// synchronous blocks around the single suspension point (the loader).
    async fn execute(&self, task: &LoadingTask) {
        self.set_state(&task.id, TaskState::Loading);
        self.events.publish(
            events::LOADING_TASK_STARTED,
            json!({ "task_id": task.id, "priority": task.priority }),
        );

        match (task.loader)().await {
            Ok(_) => {
                self.set_state(&task.id, TaskState::Complete);
                self.events
                    .publish(events::LOADING_TASK_COMPLETED, json!({ "task_id": task.id }));
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Loading task failed");
                self.set_state(&task.id, TaskState::Error(e.to_string()));
                self.events.publish(
                    events::LOADING_TASK_FAILED,
                    json!({ "task_id": task.id, "error": e.to_string() }),
                );
            }
        }

        self.announce_milestones();
    }

    fn set_state(&self, id: &str, state: TaskState) {
        {
            let mut states = self.states.lock();
            states.insert(id.to_string(), state);
        }
        self.publish_snapshot();
    }

    fn announce_milestones(&self) {
        let snapshot = self.snapshot();
        let mut milestones = self.milestones.lock();
        if snapshot.is_critical_loaded && !milestones.critical_announced {
            milestones.critical_announced = true;
            self.events
                .publish(events::LOADING_CRITICAL_COMPLETE, json!({}));
        }
        if snapshot.is_all_loaded && !milestones.all_announced {
            milestones.all_announced = true;
            self.events.publish(events::LOADING_ALL_COMPLETE, json!({}));
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn snapshot_locked(&self, states: &HashMap<String, TaskState>) -> LoadingSnapshot {
        let total = self.tasks.len();
        let completed = states.values().filter(|s| s.is_complete()).count();
        let progress = if total > 0 {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        } else {
            0
        };

        let critical: Vec<&LoadingTask> = self
            .tasks
            .iter()
            .filter(|t| t.priority == PRIORITY_CRITICAL)
            .collect();
        let is_critical_loaded = !critical.is_empty()
            && critical
                .iter()
                .all(|t| states.get(&t.id).map(TaskState::is_complete).unwrap_or(false));

        // All loaded when nothing is in flight and nothing more can run:
        // every task is settled, or pending with an unmet (failed/blocked)
        // dependency.
        let any_loading = states.values().any(|s| *s == TaskState::Loading);
        let any_runnable = self.tasks.iter().any(|t| {
            states.get(&t.id) == Some(&TaskState::Pending)
                && t.dependencies
                    .iter()
                    .all(|dep| states.get(dep).map(TaskState::is_complete).unwrap_or(false))
        });
        let is_all_loaded = total > 0 && !any_loading && !any_runnable;

        LoadingSnapshot {
            progress,
            completed_tasks: completed,
            total_tasks: total,
            is_critical_loaded,
            is_all_loaded,
            task_states: states.clone(),
        }
    }
}
