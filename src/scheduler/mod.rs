//! Task admission scheduling.
//!
//! The [`TaskScheduler`] bounds how many tasks may run at once and decides,
//! by priority and arrival order, which queued task is admitted next.

mod handle;
mod queue;
mod types;

pub use handle::Ticket;
pub use queue::TaskScheduler;
pub use types::{Admission, CancelOutcome, SchedulerError, SchedulerStats};
