//! The task engine.
//!
//! [`TaskEngine`] is the entry point of the library. Given a set of tasks it
//! resolves them into stages and runs the stages strictly in order. Inside a
//! stage every task is spawned at once and admitted through the engine's
//! [`TaskScheduler`], so at most `max_concurrency` tasks execute together.
//!
//! For each task the engine consults the [`CacheManager`], dispatches to the
//! executor registered for the task type, applies the per-attempt timeout and
//! the retry policy, and publishes lifecycle events on the [`EventBus`].
//!
//! A failed task does not stop the run: later stages still execute, including
//! the failed task's dependents.

mod runner;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::cache::{CacheManager, SweeperHandle};
use crate::config::{ConfigError, EngineConfig};
use crate::core::resolver::{DependencyResolver, ResolveError};
use crate::core::result::{ExecutionStatus, TaskResult};
use crate::core::task::Task;
use crate::core::types::{RunId, TaskId, TaskType};
use crate::events::{Event, EventBus};
use crate::execution::ExecutorManager;
use crate::scheduler::TaskScheduler;

use runner::{RunningMap, TaskRunner};

/// Executor type used to deliver cancellation requests.
///
/// Cancellation is routed through the executor registered for this type
/// rather than the cancelled task's own type. The built-in typed executors
/// share one command executor, so this reaches every built-in child process.
const CANCEL_EXECUTOR_TYPE: TaskType = TaskType::Custom;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The tasks do not form a valid graph; nothing was executed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Snapshot of engine activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Tasks currently executing.
    pub running: usize,
    /// Tasks waiting for admission.
    pub queued: usize,
    /// Configured concurrency cap.
    pub workers: usize,
}

/// Orchestrates dependency resolution, caching, execution and events.
///
/// # Example
///
/// ```no_run
/// use stagehand::{EngineConfig, Task, TaskEngine, TaskType};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = TaskEngine::new(EngineConfig::default())?;
///
/// let tasks = vec![
///     Task::builder("build", TaskType::Build).command("cargo build").build(),
///     Task::builder("test", TaskType::Test)
///         .command("cargo test")
///         .depends_on(["build"])
///         .build(),
/// ];
///
/// let results = engine.execute(tasks).await?;
/// assert!(results.values().all(|r| r.is_success()));
/// # Ok(())
/// # }
/// ```
pub struct TaskEngine {
    config: EngineConfig,
    scheduler: Arc<TaskScheduler>,
    cache: Arc<CacheManager>,
    executors: Arc<ExecutorManager>,
    event_bus: Arc<EventBus>,
    running: RunningMap,
    _sweeper: Option<SweeperHandle>,
}

impl TaskEngine {
    /// Create an engine with the built-in executors, a fresh cache and a
    /// fresh event bus.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let cache = Arc::new(CacheManager::new(
            config.cache.max_size,
            config.cache.default_ttl(),
        ));
        Self::with_components(
            config,
            cache,
            Arc::new(ExecutorManager::new()),
            Arc::new(EventBus::new()),
        )
    }

    /// Create an engine around existing collaborators.
    ///
    /// The cache sweeper is started when the configuration asks for one and
    /// the engine is created inside a tokio runtime.
    pub fn with_components(
        config: EngineConfig,
        cache: Arc<CacheManager>,
        executors: Arc<ExecutorManager>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let scheduler = Arc::new(
            TaskScheduler::new(config.max_concurrency).with_event_bus(Arc::clone(&event_bus)),
        );

        let sweeper = match config.cache.sweep_interval() {
            Some(interval) if tokio::runtime::Handle::try_current().is_ok() => {
                Some(cache.spawn_sweeper(interval))
            }
            Some(_) => {
                debug!("no tokio runtime, cache sweeper not started");
                None
            }
            None => None,
        };

        Ok(Self {
            config,
            scheduler,
            cache,
            executors,
            event_bus,
            running: Arc::new(RwLock::new(HashMap::new())),
            _sweeper: sweeper,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn executors(&self) -> &Arc<ExecutorManager> {
        &self.executors
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn runner(&self, run_id: RunId) -> TaskRunner {
        TaskRunner {
            run_id,
            scheduler: Arc::clone(&self.scheduler),
            cache: Arc::clone(&self.cache),
            executors: Arc::clone(&self.executors),
            event_bus: Arc::clone(&self.event_bus),
            running: Arc::clone(&self.running),
            retry: self.config.retry_policy(),
            default_timeout: self.config.default_timeout(),
        }
    }

    /// Run a set of tasks.
    ///
    /// Returns one result per task. Graph errors are returned before any
    /// task runs; task failures are reported in the result map.
    pub async fn execute(
        &self,
        tasks: Vec<Task>,
    ) -> Result<HashMap<TaskId, TaskResult>, EngineError> {
        let run_id = RunId::new();
        let task_count = tasks.len();
        let stages = DependencyResolver::resolve(tasks)?;

        let span = info_span!(
            "engine_run",
            run = %run_id,
            task_count = task_count,
            stage_count = stages.len(),
        );

        async move {
            info!("starting run");
            let mut results = HashMap::with_capacity(task_count);

            for (index, stage) in stages.into_iter().enumerate() {
                debug!(stage = index, task_count = stage.len(), "dispatching stage");

                let mut handles = Vec::with_capacity(stage.len());
                for task in stage {
                    let task_span = info_span!(
                        "task",
                        task = %task.id,
                        kind = %task.task_type,
                    );
                    let runner = self.runner(run_id);
                    let handle =
                        tokio::spawn(runner.run(Arc::clone(&task)).instrument(task_span));
                    handles.push((task, handle));
                }

                // Stage barrier: every task settles before the next stage.
                for (task, handle) in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            error!(task = %task.id, error = %e, "task panicked");
                            self.runner(run_id)
                                .settle_panicked(&task, e.to_string())
                                .await
                        }
                    };
                    results.insert(task.id.clone(), result);
                }
            }

            let failed = results.values().filter(|r| !r.is_success()).count();
            if failed > 0 {
                warn!(failed, "run finished with failures");
            } else {
                info!("run finished");
            }
            Ok(results)
        }
        .instrument(span)
        .await
    }

    /// Cancel a task in every run that contains it.
    ///
    /// A running task is marked cancelled, `task:cancelled` is published and
    /// its executor is asked to stop; it is not retried afterwards. A task
    /// still waiting for admission is removed from the queue. Returns `false`
    /// when the task is neither running nor queued, or was already cancelled.
    pub async fn cancel(&self, task_id: &TaskId) -> bool {
        let cancelled: Vec<_> = {
            let mut running = self.running.write().await;
            running
                .iter_mut()
                .filter(|((_, id), entry)| {
                    id == task_id && !entry.execution.status.is_terminal()
                })
                .map(|(_, entry)| {
                    entry.execution.status = ExecutionStatus::Cancelled;
                    (Arc::clone(&entry.task), entry.execution.clone())
                })
                .collect()
        };

        let dequeued = self.scheduler.cancel_queued(task_id).await;
        if cancelled.is_empty() {
            return dequeued > 0;
        }

        info!(task = %task_id, "cancelling running task");
        for (task, execution) in cancelled {
            self.event_bus
                .emit(Event::task_cancelled(task, Some(execution)))
                .await;
        }

        let executor = self.executors.get_executor(CANCEL_EXECUTOR_TYPE).await;
        if let Err(e) = executor.cancel(task_id).await {
            warn!(task = %task_id, error = %e, "executor failed to cancel task");
        }
        true
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running.read().await.len(),
            queued: self.scheduler.queued_count().await,
            workers: self.config.max_concurrency,
        }
    }
}
