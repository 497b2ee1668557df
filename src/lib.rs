//! stagehand - a task orchestration engine.
//!
//! Tasks declare their type, their dependencies and how to run them. The
//! [`TaskEngine`] resolves them into stages, runs each stage concurrently
//! under a concurrency cap, retries and times out failing work, memoizes
//! results in a content-addressed cache and reports progress as events.

pub mod cache;
pub mod config;
pub mod core;
pub mod engine;
pub mod events;
pub mod execution;
pub mod scheduler;
pub mod testing;

pub use cache::{CacheError, CacheManager, CacheStats};
pub use config::{CacheConfig, ConfigError, EngineConfig, TaskFile, TaskFileLoader};
pub use core::environment::Environment;
pub use core::resolver::{DependencyGraph, DependencyResolver, ResolveError, Stage};
pub use core::result::{ExecutionStatus, TaskExecution, TaskResult};
pub use core::retry::RetryPolicy;
pub use core::task::{CacheOptions, Task, TaskBuilder, TaskConfig};
pub use core::types::{RunId, TaskId, TaskType};
pub use engine::{EngineError, EngineStatus, TaskEngine};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandExecutor, Executor, ExecutorError, ExecutorManager, TypedExecutor};
pub use scheduler::{
    Admission, CancelOutcome, SchedulerError, SchedulerStats, TaskScheduler, Ticket,
};
