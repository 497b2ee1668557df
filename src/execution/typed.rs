//! Per-type executors.
//!
//! Each declared task type gets a [`TypedExecutor`] that adds logging in the
//! vocabulary of that type and delegates the actual work to a shared
//! [`CommandExecutor`], so every built-in executor honors the same result
//! contract.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::result::TaskResult;
use crate::core::task::Task;
use crate::core::types::{TaskId, TaskType};

use super::command::CommandExecutor;
use super::executor::{Executor, ExecutorError};

/// Executor dedicated to a single task type.
pub struct TypedExecutor {
    task_type: TaskType,
    name: String,
    inner: Arc<CommandExecutor>,
}

impl TypedExecutor {
    pub fn new(task_type: TaskType, inner: Arc<CommandExecutor>) -> Self {
        Self {
            task_type,
            name: format!("{}-executor", task_type),
            inner,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    fn verb(&self) -> &'static str {
        match self.task_type {
            TaskType::Build => "building",
            TaskType::Test => "running tests for",
            TaskType::Lint => "linting",
            TaskType::Deploy => "deploying",
            TaskType::Custom => "running",
        }
    }
}

#[async_trait]
impl Executor for TypedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, ExecutorError> {
        if !self.supports(task.task_type) {
            return Err(ExecutorError::Unsupported {
                executor: self.name.clone(),
                task_type: task.task_type,
            });
        }

        info!(task = %task.id, kind = %self.task_type, "{} {}", self.verb(), task.name);
        let result = self.inner.execute(task).await?;

        if result.is_success() {
            info!(
                task = %task.id,
                kind = %self.task_type,
                duration_ms = result.duration.as_millis() as u64,
                "{} finished",
                task.name
            );
        } else if self.task_type == TaskType::Deploy {
            warn!(
                task = %task.id,
                exit_code = result.exit_code,
                "deployment of {} failed, target may be partially updated",
                task.name
            );
        } else {
            warn!(
                task = %task.id,
                kind = %self.task_type,
                exit_code = result.exit_code,
                "{} failed",
                task.name
            );
        }

        Ok(result)
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), ExecutorError> {
        self.inner.cancel(task_id).await
    }

    fn supports(&self, task_type: TaskType) -> bool {
        task_type == self.task_type
    }
}
