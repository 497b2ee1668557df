//! Scheduler type definitions.
//!
//! This module contains the error type, admission outcomes and statistics
//! reported by the [`TaskScheduler`](super::TaskScheduler).

use serde::Serialize;
use thiserror::Error;

use crate::core::types::TaskId;

/// Errors that can occur in the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The task is already queued or running.
    #[error("task already scheduled: {0}")]
    AlreadyScheduled(TaskId),
}

/// How a scheduled task left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The task was admitted into the running set.
    Started,
    /// The task was removed from the queue before it was admitted.
    Cancelled,
}

/// Result of [`TaskScheduler::cancel`](super::TaskScheduler::cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and has been removed.
    Dequeued,
    /// The task is running; a cancellation request was published.
    CancellationRequested,
    /// The scheduler does not know the task.
    NotFound,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    /// `running / max_concurrent`.
    pub utilization: f64,
}

impl SchedulerStats {
    pub(crate) fn new(queued: usize, running: usize, max_concurrent: usize) -> Self {
        let utilization = match (max_concurrent, running) {
            (0, 0) => 0.0,
            (0, _) => 1.0,
            (max, running) => running as f64 / max as f64,
        };
        Self {
            queued,
            running,
            max_concurrent,
            utilization,
        }
    }
}
