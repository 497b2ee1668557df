//! Lifecycle events and event handling.
//!
//! The engine and scheduler report task progress as [`Event`]s published on
//! an [`EventBus`]. Consumers either register an [`EventHandler`] or take a
//! channel from [`EventBus::subscribe`]. Event names (see [`Event::name`])
//! are the stable contract for reporters.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, mpsc};

use crate::core::result::{TaskExecution, TaskResult};
use crate::core::task::Task;

/// Lifecycle events emitted during execution.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task has started. Always the first event for a task.
    TaskStart { task: Arc<Task>, timestamp: Instant },

    /// A task was served from the cache.
    TaskCached {
        task: Arc<Task>,
        result: TaskResult,
        timestamp: Instant,
    },

    /// A task's executor produced a successful result.
    TaskSuccess {
        task: Arc<Task>,
        result: TaskResult,
        timestamp: Instant,
    },

    /// A task failed after exhausting its attempts.
    TaskFailed {
        task: Arc<Task>,
        error: String,
        result: TaskResult,
        timestamp: Instant,
    },

    /// A task reached a terminal state. Always the last event for a task.
    TaskComplete {
        task: Arc<Task>,
        execution: TaskExecution,
        timestamp: Instant,
    },

    /// A task was cancelled, either while running in the engine or while
    /// still queued in the scheduler.
    TaskCancelled {
        task: Arc<Task>,
        execution: Option<TaskExecution>,
        timestamp: Instant,
    },

    /// An attempt failed and the task will be retried after the retry delay.
    TaskRetrying {
        task: Arc<Task>,
        /// The attempt that just failed (1-indexed).
        attempt: u32,
        /// Total attempts allowed, including the first.
        max_attempts: u32,
        error: String,
        timestamp: Instant,
    },

    /// The scheduler was asked to cancel a task that is already running.
    /// Stopping it is up to whoever executes it.
    CancellationRequested { task: Arc<Task>, timestamp: Instant },
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskStart { .. } => "task:start",
            Event::TaskCached { .. } => "task:cached",
            Event::TaskSuccess { .. } => "task:success",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskComplete { .. } => "task:complete",
            Event::TaskCancelled { .. } => "task:cancelled",
            Event::TaskRetrying { .. } => "task:retrying",
            Event::CancellationRequested { .. } => "task:cancel-requested",
        }
    }

    /// The task the event is about.
    pub fn task(&self) -> &Arc<Task> {
        match self {
            Event::TaskStart { task, .. }
            | Event::TaskCached { task, .. }
            | Event::TaskSuccess { task, .. }
            | Event::TaskFailed { task, .. }
            | Event::TaskComplete { task, .. }
            | Event::TaskCancelled { task, .. }
            | Event::TaskRetrying { task, .. }
            | Event::CancellationRequested { task, .. } => task,
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TaskStart { timestamp, .. }
            | Event::TaskCached { timestamp, .. }
            | Event::TaskSuccess { timestamp, .. }
            | Event::TaskFailed { timestamp, .. }
            | Event::TaskComplete { timestamp, .. }
            | Event::TaskCancelled { timestamp, .. }
            | Event::TaskRetrying { timestamp, .. }
            | Event::CancellationRequested { timestamp, .. } => *timestamp,
        }
    }

    pub fn task_start(task: Arc<Task>) -> Self {
        Event::TaskStart {
            task,
            timestamp: Instant::now(),
        }
    }

    pub fn task_cached(task: Arc<Task>, result: TaskResult) -> Self {
        Event::TaskCached {
            task,
            result,
            timestamp: Instant::now(),
        }
    }

    pub fn task_success(task: Arc<Task>, result: TaskResult) -> Self {
        Event::TaskSuccess {
            task,
            result,
            timestamp: Instant::now(),
        }
    }

    pub fn task_failed(task: Arc<Task>, error: String, result: TaskResult) -> Self {
        Event::TaskFailed {
            task,
            error,
            result,
            timestamp: Instant::now(),
        }
    }

    pub fn task_complete(task: Arc<Task>, execution: TaskExecution) -> Self {
        Event::TaskComplete {
            task,
            execution,
            timestamp: Instant::now(),
        }
    }

    pub fn task_cancelled(task: Arc<Task>, execution: Option<TaskExecution>) -> Self {
        Event::TaskCancelled {
            task,
            execution,
            timestamp: Instant::now(),
        }
    }

    pub fn task_retrying(task: Arc<Task>, attempt: u32, max_attempts: u32, error: String) -> Self {
        Event::TaskRetrying {
            task,
            attempt,
            max_attempts,
            error,
            timestamp: Instant::now(),
        }
    }

    pub fn cancellation_requested(task: Arc<Task>) -> Self {
        Event::CancellationRequested {
            task,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Forwards events into an unbounded channel.
struct ChannelHandler {
    sender: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl EventHandler for ChannelHandler {
    async fn handle(&self, event: &Event) {
        // A dropped receiver just means nobody listens anymore.
        let _ = self.sender.send(event.clone());
    }
}

/// Event bus for distributing events to registered handlers.
///
/// Handlers are called in registration order, one event at a time.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Subscribe through a channel instead of a handler.
    ///
    /// Every event emitted after this call is delivered to the receiver.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.register(Arc::new(ChannelHandler { sender })).await;
        receiver
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
