//! Task execution.
//!
//! This module provides the [`Executor`] contract, the shell-backed
//! [`CommandExecutor`], per-type [`TypedExecutor`]s and the
//! [`ExecutorManager`] registry that picks an executor for each task.

mod command;
mod executor;
mod manager;
mod typed;

pub use command::{CommandExecutor, EXIT_CANCELLED, EXIT_SPAWN_FAILED};
pub use executor::{Executor, ExecutorError};
pub use manager::ExecutorManager;
pub use typed::TypedExecutor;
