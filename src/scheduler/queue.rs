//! Priority-ordered admission control.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info};

use crate::core::task::Task;
use crate::core::types::{RunId, TaskId};
use crate::events::{Event, EventBus};

use super::handle::Ticket;
use super::types::{Admission, CancelOutcome, SchedulerError, SchedulerStats};

/// Identifies one admission: a task id, optionally scoped to a run.
///
/// Scoped keys let concurrent runs schedule tasks that share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AdmissionKey {
    run: Option<RunId>,
    task: TaskId,
}

/// A task waiting for admission.
struct QueuedTask {
    priority: i32,
    sequence: u64,
    key: AdmissionKey,
    task: Arc<Task>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, then earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: BinaryHeap<QueuedTask>,
    running: HashMap<AdmissionKey, Arc<Task>>,
    waiters: HashMap<AdmissionKey, oneshot::Sender<Admission>>,
    max_concurrent: usize,
    next_sequence: u64,
}

impl SchedulerState {
    fn is_queued(&self, key: &AdmissionKey) -> bool {
        self.queue.iter().any(|queued| &queued.key == key)
    }

    /// Admit queued tasks while there is capacity.
    fn drain(&mut self) {
        while self.running.len() < self.max_concurrent {
            let Some(next) = self.queue.pop() else {
                break;
            };
            debug!(task = %next.key.task, priority = next.priority, "task admitted");
            if let Some(waiter) = self.waiters.remove(&next.key) {
                // The caller may have dropped its ticket.
                let _ = waiter.send(Admission::Started);
            }
            self.running.insert(next.key, next.task);
        }
    }

    /// Remove every queued entry for `task_id`, in any run, along with the
    /// waiters still to be told.
    fn dequeue(
        &mut self,
        task_id: &TaskId,
    ) -> Vec<(Arc<Task>, Option<oneshot::Sender<Admission>>)> {
        let mut removed = Vec::new();
        let queue = std::mem::take(&mut self.queue);
        self.queue = queue
            .into_iter()
            .filter_map(|queued| {
                if &queued.key.task == task_id {
                    removed.push((queued.task, self.waiters.remove(&queued.key)));
                    None
                } else {
                    Some(queued)
                }
            })
            .collect();
        removed
    }
}

/// Admission control for tasks: a priority queue in front of a bounded
/// running set.
///
/// The scheduler does not run anything. Callers [`schedule`](Self::schedule)
/// a task, await the returned [`Ticket`], do the work, and then report it
/// with [`complete`](Self::complete) so the next queued task is admitted.
/// It knows nothing about dependencies; ordering between dependent tasks is
/// the resolver's concern.
///
/// Tasks scheduled with [`schedule_in`](Self::schedule_in) are keyed by run,
/// so the same id may be queued or running once per run. All scopes share
/// one capacity.
pub struct TaskScheduler {
    state: Mutex<SchedulerState>,
    event_bus: Option<Arc<EventBus>>,
}

impl TaskScheduler {
    /// Create a scheduler admitting at most `max_concurrent` tasks at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                max_concurrent,
                ..Default::default()
            }),
            event_bus: None,
        }
    }

    /// Publish cancellation events on the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Queue a task. Higher priorities are admitted first; equal priorities
    /// are admitted in arrival order.
    pub async fn schedule(
        &self,
        task: impl Into<Arc<Task>>,
        priority: i32,
    ) -> Result<Ticket, SchedulerError> {
        self.enqueue(None, task.into(), priority).await
    }

    /// Queue a task on behalf of one run.
    ///
    /// The task only conflicts with tasks of the same id in the same run.
    pub async fn schedule_in(
        &self,
        run: RunId,
        task: impl Into<Arc<Task>>,
        priority: i32,
    ) -> Result<Ticket, SchedulerError> {
        self.enqueue(Some(run), task.into(), priority).await
    }

    async fn enqueue(
        &self,
        run: Option<RunId>,
        task: Arc<Task>,
        priority: i32,
    ) -> Result<Ticket, SchedulerError> {
        let key = AdmissionKey {
            run,
            task: task.id.clone(),
        };
        let mut state = self.state.lock().await;

        if state.running.contains_key(&key) || state.is_queued(&key) {
            return Err(SchedulerError::AlreadyScheduled(key.task));
        }

        let (sender, receiver) = oneshot::channel();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.waiters.insert(key.clone(), sender);
        debug!(task = %key.task, priority, "task queued");
        let ticket = Ticket::new(key.task.clone(), run, receiver);
        state.queue.push(QueuedTask {
            priority,
            sequence,
            key,
            task,
        });

        state.drain();
        Ok(ticket)
    }

    /// Report that an admitted task has finished.
    ///
    /// Returns `false` if the task was not running.
    pub async fn complete(&self, task_id: &TaskId) -> bool {
        self.release(None, task_id).await
    }

    /// Report that a task admitted through [`schedule_in`](Self::schedule_in)
    /// has finished.
    pub async fn complete_in(&self, run: RunId, task_id: &TaskId) -> bool {
        self.release(Some(run), task_id).await
    }

    async fn release(&self, run: Option<RunId>, task_id: &TaskId) -> bool {
        let key = AdmissionKey {
            run,
            task: task_id.clone(),
        };
        let mut state = self.state.lock().await;
        if state.running.remove(&key).is_none() {
            return false;
        }
        state.drain();
        true
    }

    /// Cancel a task, in every run it was scheduled for.
    ///
    /// Queued entries are removed and their tickets resolve to
    /// [`Admission::Cancelled`]. Running entries are left alone; only a
    /// cancellation request is published.
    pub async fn cancel(&self, task_id: &TaskId) -> CancelOutcome {
        if self.cancel_queued(task_id).await > 0 {
            return CancelOutcome::Dequeued;
        }

        let running: Vec<Arc<Task>> = {
            let state = self.state.lock().await;
            state
                .running
                .iter()
                .filter(|(key, _)| &key.task == task_id)
                .map(|(_, task)| Arc::clone(task))
                .collect()
        };

        if running.is_empty() {
            debug!(task = %task_id, "cancel: task not found");
            return CancelOutcome::NotFound;
        }

        info!(task = %task_id, "cancellation requested for running task");
        if let Some(bus) = &self.event_bus {
            for task in running {
                bus.emit(Event::cancellation_requested(task)).await;
            }
        }
        CancelOutcome::CancellationRequested
    }

    /// Remove queued entries for `task_id` without touching running ones.
    ///
    /// Publishes `task:cancelled` for each removed entry before its ticket
    /// resolves, and returns how many were removed.
    pub async fn cancel_queued(&self, task_id: &TaskId) -> usize {
        let removed = self.state.lock().await.dequeue(task_id);
        if removed.is_empty() {
            return 0;
        }

        info!(task = %task_id, count = removed.len(), "queued task cancelled");
        let count = removed.len();
        for (task, waiter) in removed {
            if let Some(bus) = &self.event_bus {
                bus.emit(Event::task_cancelled(task, None)).await;
            }
            if let Some(waiter) = waiter {
                let _ = waiter.send(Admission::Cancelled);
            }
        }
        count
    }

    /// Stop admitting tasks.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        state.max_concurrent = 0;
        info!("scheduler paused");
    }

    /// Restore capacity to `max_concurrent` and admit queued tasks.
    pub async fn resume(&self, max_concurrent: usize) {
        let mut state = self.state.lock().await;
        state.max_concurrent = max_concurrent;
        info!(max_concurrent, "scheduler resumed");
        state.drain();
    }

    /// Grow or shrink capacity by `delta`, saturating at zero.
    ///
    /// Shrinking never evicts running tasks; it only holds back admission
    /// until enough of them complete. Returns the new capacity.
    pub async fn adjust_concurrency(&self, delta: isize) -> usize {
        let mut state = self.state.lock().await;
        state.max_concurrent = state.max_concurrent.saturating_add_signed(delta);
        debug!(max_concurrent = state.max_concurrent, "concurrency adjusted");
        state.drain();
        state.max_concurrent
    }

    pub async fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().await;
        SchedulerStats::new(state.queue.len(), state.running.len(), state.max_concurrent)
    }

    /// Ids of tasks currently admitted, once per admission.
    pub async fn running(&self) -> Vec<TaskId> {
        let state = self.state.lock().await;
        let mut ids: Vec<TaskId> = state.running.keys().map(|key| key.task.clone()).collect();
        ids.sort();
        ids
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn running_count(&self) -> usize {
        self.state.lock().await.running.len()
    }
}
