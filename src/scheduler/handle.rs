//! Admission tickets.
//!
//! Scheduling a task returns a [`Ticket`] the caller awaits before doing the
//! work. The ticket settles when the scheduler admits the task or drops it
//! from the queue.

use tokio::sync::oneshot;

use crate::core::types::{RunId, TaskId};

use super::types::Admission;

/// Pending admission of a scheduled task.
#[derive(Debug)]
pub struct Ticket {
    task_id: TaskId,
    run_id: Option<RunId>,
    receiver: oneshot::Receiver<Admission>,
}

impl Ticket {
    pub(crate) fn new(
        task_id: TaskId,
        run_id: Option<RunId>,
        receiver: oneshot::Receiver<Admission>,
    ) -> Self {
        Self {
            task_id,
            run_id,
            receiver,
        }
    }

    /// Id of the task this ticket belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Run the task was scheduled for, if it was scheduled with one.
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Wait until the task is admitted or dequeued.
    ///
    /// A scheduler that is dropped with the task still queued counts as a
    /// cancellation.
    pub async fn admitted(self) -> Admission {
        self.receiver.await.unwrap_or(Admission::Cancelled)
    }

    /// Check the admission without waiting.
    ///
    /// Returns `None` while the task is still queued.
    pub fn try_admission(&mut self) -> Option<Admission> {
        match self.receiver.try_recv() {
            Ok(admission) => Some(admission),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Admission::Cancelled),
        }
    }
}
