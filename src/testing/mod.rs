//! Testing utilities for users of the stagehand library.
//!
//! This module provides helpers for testing task orchestration:
//!
//! - [`ScriptedExecutor`]: Returns a fixed sequence of results and counts calls
//! - [`FailingExecutor`]: Returns errors N times then succeeds
//! - [`PendingExecutor`]: Never finishes, for timeout and cancellation tests
//! - [`RecordingHandler`]: Captures emitted events

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::result::TaskResult;
use crate::core::task::Task;
use crate::core::types::{TaskId, TaskType};
use crate::events::{Event, EventHandler};
use crate::execution::{Executor, ExecutorError};

/// An executor that plays back scripted results.
///
/// Results are returned in order; once the script runs out the last result
/// repeats. An empty script always succeeds with empty output.
///
/// # Example
///
/// ```
/// use stagehand::testing::ScriptedExecutor;
/// use stagehand::TaskResult;
/// use std::time::Duration;
///
/// // Fails once, then succeeds.
/// let executor = ScriptedExecutor::new(vec![
///     TaskResult::failure(2, "flaky", Duration::ZERO),
///     TaskResult::success("ok", Duration::ZERO),
/// ]);
/// ```
pub struct ScriptedExecutor {
    name: String,
    state: Mutex<ScriptState>,
    delay: Option<Duration>,
}

struct ScriptState {
    script: VecDeque<TaskResult>,
    last: TaskResult,
    calls: Vec<TaskId>,
    cancelled: Vec<TaskId>,
}

impl ScriptedExecutor {
    /// Create an executor returning `results` in order.
    pub fn new(results: Vec<TaskResult>) -> Self {
        Self {
            name: "scripted".to_string(),
            state: Mutex::new(ScriptState {
                script: results.into(),
                last: TaskResult::success("", Duration::ZERO),
                calls: Vec::new(),
                cancelled: Vec::new(),
            }),
            delay: None,
        }
    }

    /// Create an executor that always succeeds with the given output.
    pub fn succeeding(output: impl Into<String>) -> Self {
        Self::new(vec![TaskResult::success(output, Duration::ZERO)])
    }

    /// Create an executor that always fails with the given error.
    pub fn failing(error: impl Into<String>) -> Self {
        Self::new(vec![TaskResult::failure(1, error, Duration::ZERO)])
    }

    /// Sleep for `delay` before every result.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the name reported by [`Executor::name`].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of times `execute` was called.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Number of times `execute` was called for one task.
    pub async fn calls_for(&self, task_id: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|id| id.as_str() == task_id)
            .count()
    }

    /// Task ids in the order they were executed.
    pub async fn calls(&self) -> Vec<TaskId> {
        self.state.lock().await.calls.clone()
    }

    /// Task ids passed to `cancel`.
    pub async fn cancelled(&self) -> Vec<TaskId> {
        self.state.lock().await.cancelled.clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, ExecutorError> {
        let result = {
            let mut state = self.state.lock().await;
            state.calls.push(task.id.clone());
            if let Some(next) = state.script.pop_front() {
                state.last = next;
            }
            state.last.clone()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(result)
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), ExecutorError> {
        self.state.lock().await.cancelled.push(task_id.clone());
        Ok(())
    }

    fn supports(&self, _task_type: TaskType) -> bool {
        true
    }
}

/// An executor that returns `Err` a configurable number of times before
/// succeeding.
///
/// Useful for testing retry logic on exceptional executor failures.
///
/// # Example
///
/// ```
/// use stagehand::testing::FailingExecutor;
///
/// // Fails 2 times, then succeeds on the 3rd attempt
/// let executor = FailingExecutor::new(2);
/// ```
pub struct FailingExecutor {
    state: Mutex<FailingState>,
    error_message: String,
}

struct FailingState {
    failures_remaining: Option<u32>,
    call_count: u32,
}

impl FailingExecutor {
    /// Create an executor that fails `fail_count` times then succeeds.
    pub fn new(fail_count: u32) -> Self {
        Self {
            state: Mutex::new(FailingState {
                failures_remaining: Some(fail_count),
                call_count: 0,
            }),
            error_message: "intentional test failure".to_string(),
        }
    }

    /// Create an executor that never succeeds.
    pub fn always() -> Self {
        Self {
            state: Mutex::new(FailingState {
                failures_remaining: None,
                call_count: 0,
            }),
            error_message: "intentional test failure".to_string(),
        }
    }

    /// Use a custom error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Get the number of times this executor has been called.
    pub async fn call_count(&self) -> u32 {
        self.state.lock().await.call_count
    }
}

#[async_trait]
impl Executor for FailingExecutor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _task: &Task) -> Result<TaskResult, ExecutorError> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        match &mut state.failures_remaining {
            None => Err(ExecutorError::Failed(self.error_message.clone())),
            Some(0) => Ok(TaskResult::success("", Duration::ZERO)),
            Some(remaining) => {
                *remaining -= 1;
                Err(ExecutorError::Failed(self.error_message.clone()))
            }
        }
    }

    async fn cancel(&self, _task_id: &TaskId) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn supports(&self, _task_type: TaskType) -> bool {
        true
    }
}

/// An executor whose executions never finish on their own.
///
/// Pair it with a task timeout or [`TaskEngine::cancel`](crate::TaskEngine::cancel).
#[derive(Default)]
pub struct PendingExecutor {
    calls: Mutex<u32>,
    cancelled: Mutex<Vec<TaskId>>,
}

impl PendingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn call_count(&self) -> u32 {
        *self.calls.lock().await
    }

    /// Task ids passed to `cancel`.
    pub async fn cancelled(&self) -> Vec<TaskId> {
        self.cancelled.lock().await.clone()
    }
}

#[async_trait]
impl Executor for PendingExecutor {
    fn name(&self) -> &str {
        "pending"
    }

    async fn execute(&self, _task: &Task) -> Result<TaskResult, ExecutorError> {
        *self.calls.lock().await += 1;
        std::future::pending().await
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), ExecutorError> {
        self.cancelled.lock().await.push(task_id.clone());
        Ok(())
    }

    fn supports(&self, _task_type: TaskType) -> bool {
        true
    }
}

/// An event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Names of all events received so far.
    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(Event::name).collect()
    }

    /// Names of the events about one task, in order.
    pub async fn names_for(&self, task_id: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.task().id.as_str() == task_id)
            .map(Event::name)
            .collect()
    }

    /// Number of events with the given name.
    pub async fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
