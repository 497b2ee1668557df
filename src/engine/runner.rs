//! Per-task execution: admission, cache lookup, attempts and events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::core::result::{ExecutionStatus, TaskExecution, TaskResult};
use crate::core::retry::RetryPolicy;
use crate::core::task::Task;
use crate::core::types::{RunId, TaskId};
use crate::events::{Event, EventBus};
use crate::execution::{EXIT_CANCELLED, Executor, ExecutorManager};
use crate::scheduler::{Admission, TaskScheduler};

/// A task the engine is currently running.
pub(crate) struct RunningTask {
    pub(crate) task: Arc<Task>,
    pub(crate) execution: TaskExecution,
}

/// Running tasks keyed by run, so concurrent runs may reuse task ids.
pub(crate) type RunningMap = Arc<RwLock<HashMap<(RunId, TaskId), RunningTask>>>;

/// Everything a spawned task needs, cloned out of the engine.
#[derive(Clone)]
pub(crate) struct TaskRunner {
    pub(crate) run_id: RunId,
    pub(crate) scheduler: Arc<TaskScheduler>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) executors: Arc<ExecutorManager>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) running: RunningMap,
    pub(crate) retry: RetryPolicy,
    pub(crate) default_timeout: Duration,
}

impl TaskRunner {
    /// Run one task to a terminal result.
    pub(crate) async fn run(self, task: Arc<Task>) -> TaskResult {
        let ticket = match self
            .scheduler
            .schedule_in(self.run_id, Arc::clone(&task), 0)
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "task could not be scheduled");
                return TaskResult::failure(1, e.to_string(), Duration::ZERO);
            }
        };

        if ticket.admitted().await == Admission::Cancelled {
            info!("task cancelled before it started");
            let result = TaskResult::failure(
                EXIT_CANCELLED,
                "task cancelled before it started",
                Duration::ZERO,
            );
            self.finish(&task, ExecutionStatus::Cancelled, result.clone())
                .await;
            return result;
        }

        let result = self.run_admitted(task.clone()).await;
        self.scheduler.complete_in(self.run_id, &task.id).await;
        result
    }

    async fn run_admitted(&self, task: Arc<Task>) -> TaskResult {
        let start = Instant::now();
        self.running.write().await.insert(
            self.key(&task.id),
            RunningTask {
                task: Arc::clone(&task),
                execution: TaskExecution::start(task.id.clone()),
            },
        );
        self.event_bus.emit(Event::task_start(Arc::clone(&task))).await;

        match self.cache.get(&task).await {
            Ok(Some(result)) => {
                info!("using cached result");
                // Re-storing refreshes the entry's TTL.
                if let Err(e) = self.cache.set(&task, &result).await {
                    warn!(error = %e, "failed to refresh cached result");
                }
                self.event_bus
                    .emit(Event::task_cached(Arc::clone(&task), result.clone()))
                    .await;
                self.finish(&task, ExecutionStatus::Success, result.clone())
                    .await;
                return result;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache lookup failed, executing task"),
        }

        let executor = self.executors.get_executor(task.task_type).await;
        match self.attempt_all(&task, executor.as_ref()).await {
            Ok(result) => {
                if let Err(e) = self.cache.set(&task, &result).await {
                    warn!(error = %e, "failed to cache result");
                }
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "task succeeded"
                );
                self.event_bus
                    .emit(Event::task_success(Arc::clone(&task), result.clone()))
                    .await;
                self.finish(&task, ExecutionStatus::Success, result.clone())
                    .await;
                result
            }
            Err(error) => {
                let result = TaskResult::failure(1, error.clone(), start.elapsed());
                warn!(error = %error, "task failed");
                self.event_bus
                    .emit(Event::task_failed(Arc::clone(&task), error, result.clone()))
                    .await;
                self.finish(&task, ExecutionStatus::Failed, result.clone())
                    .await;
                result
            }
        }
    }

    /// Run attempts until one succeeds, the policy is exhausted or the task
    /// is cancelled. Returns the successful result or the last error.
    async fn attempt_all(
        &self,
        task: &Arc<Task>,
        executor: &dyn Executor,
    ) -> Result<TaskResult, String> {
        let timeout = task.config.timeout.unwrap_or(self.default_timeout);
        let max_attempts = self.retry.total_attempts();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            self.record_attempt(&task.id, attempts).await;
            debug!(attempt = attempts, max_attempts, "executing task");

            let error = match tokio::time::timeout(timeout, executor.execute(task)).await {
                Ok(Ok(result)) if result.is_success() => return Ok(result),
                Ok(Ok(result)) => result
                    .error
                    .unwrap_or_else(|| format!("task exited with code {}", result.exit_code)),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("task timed out after {}ms", timeout.as_millis()),
            };

            if self.is_cancelled(&task.id).await {
                return Err(error);
            }
            if !self.retry.should_retry(attempts) {
                return Err(error);
            }

            warn!(attempt = attempts, max_attempts, error = %error, "attempt failed, retrying");
            self.event_bus
                .emit(Event::task_retrying(
                    Arc::clone(task),
                    attempts,
                    max_attempts,
                    error.clone(),
                ))
                .await;
            tokio::time::sleep(self.retry.delay).await;

            if self.is_cancelled(&task.id).await {
                return Err(error);
            }
        }
    }

    fn key(&self, task_id: &TaskId) -> (RunId, TaskId) {
        (self.run_id, task_id.clone())
    }

    async fn record_attempt(&self, task_id: &TaskId, attempts: u32) {
        if let Some(running) = self.running.write().await.get_mut(&self.key(task_id)) {
            running.execution.attempts = attempts;
        }
    }

    async fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.running
            .read()
            .await
            .get(&self.key(task_id))
            .is_some_and(|running| running.execution.is_cancelled())
    }

    /// Move the task out of the running map and publish `task:complete`.
    async fn finish(&self, task: &Arc<Task>, status: ExecutionStatus, result: TaskResult) {
        let mut execution = match self.running.write().await.remove(&self.key(&task.id)) {
            Some(running) => running.execution,
            None => TaskExecution::start(task.id.clone()),
        };
        execution.finish(status, result);
        self.event_bus
            .emit(Event::task_complete(Arc::clone(task), execution))
            .await;
    }

    /// Settle a task whose spawned future panicked.
    pub(crate) async fn settle_panicked(&self, task: &Arc<Task>, panic: String) -> TaskResult {
        self.scheduler.complete_in(self.run_id, &task.id).await;
        let result = TaskResult::failure(1, format!("task panicked: {}", panic), Duration::ZERO);
        self.event_bus
            .emit(Event::task_failed(
                Arc::clone(task),
                result.error.clone().unwrap_or_default(),
                result.clone(),
            ))
            .await;
        self.finish(task, ExecutionStatus::Failed, result.clone())
            .await;
        result
    }
}
