//! The executor plug-in contract.
//!
//! An [`Executor`] turns a [`Task`] into a [`TaskResult`]. Expected failures
//! (non-zero exits, commands that cannot start) are reported as results with
//! a non-zero `exit_code` and an `error`. `Err(ExecutorError)` is reserved for
//! exceptional conditions; the engine retries both the same way.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::result::TaskResult;
use crate::core::task::Task;
use crate::core::types::{TaskId, TaskType};

/// Exceptional executor failures.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor cannot run tasks of this type.
    #[error("executor '{executor}' does not support task type '{task_type}'")]
    Unsupported {
        executor: String,
        task_type: TaskType,
    },

    /// Execution failed with a message.
    #[error("execution failed: {0}")]
    Failed(String),

    /// I/O failure while talking to the underlying process or service.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Strategy that runs tasks of one or more types.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use stagehand::{Executor, ExecutorError, Task, TaskId, TaskResult, TaskType};
/// use std::time::Duration;
///
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl Executor for EchoExecutor {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn execute(&self, task: &Task) -> Result<TaskResult, ExecutorError> {
///         Ok(TaskResult::success(task.name.clone(), Duration::ZERO))
///     }
///
///     async fn cancel(&self, _task_id: &TaskId) -> Result<(), ExecutorError> {
///         Ok(())
///     }
///
///     fn supports(&self, task_type: TaskType) -> bool {
///         task_type == TaskType::Custom
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Run a task to completion.
    async fn execute(&self, task: &Task) -> Result<TaskResult, ExecutorError>;

    /// Ask the executor to stop a task it is running.
    ///
    /// Best effort; unknown ids are ignored.
    async fn cancel(&self, task_id: &TaskId) -> Result<(), ExecutorError>;

    /// Whether this executor can run tasks of the given type.
    fn supports(&self, task_type: TaskType) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::Unsupported {
            executor: "docker".into(),
            task_type: TaskType::Lint,
        };
        assert_eq!(
            err.to_string(),
            "executor 'docker' does not support task type 'lint'"
        );

        let err = ExecutorError::Failed("socket closed".into());
        assert_eq!(err.to_string(), "execution failed: socket closed");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ExecutorError = io.into();
        assert!(matches!(err, ExecutorError::Io(_)));
    }
}
