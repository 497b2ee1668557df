//! Type-keyed executor registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::types::TaskType;

use super::command::CommandExecutor;
use super::executor::{Executor, ExecutorError};
use super::typed::TypedExecutor;

/// Maps task types to executors, falling back to a default.
///
/// Task types without a registered executor are run by the default executor
/// (with a warning) rather than rejected, so new types work without explicit
/// registration.
pub struct ExecutorManager {
    executors: RwLock<HashMap<TaskType, Arc<dyn Executor>>>,
    default: RwLock<Arc<dyn Executor>>,
}

impl ExecutorManager {
    /// Registry with the built-in executors.
    ///
    /// A shared [`CommandExecutor`] is the default, and `build`, `test`,
    /// `lint` and `deploy` each get a [`TypedExecutor`] on top of it.
    pub fn new() -> Self {
        let command = Arc::new(CommandExecutor::new());

        let mut executors: HashMap<TaskType, Arc<dyn Executor>> = HashMap::new();
        for task_type in [
            TaskType::Build,
            TaskType::Test,
            TaskType::Lint,
            TaskType::Deploy,
        ] {
            executors.insert(
                task_type,
                Arc::new(TypedExecutor::new(task_type, Arc::clone(&command))),
            );
        }

        Self {
            executors: RwLock::new(executors),
            default: RwLock::new(command),
        }
    }

    /// Registry with only a default executor.
    pub fn with_default(default: Arc<dyn Executor>) -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
            default: RwLock::new(default),
        }
    }

    /// Register an executor for a task type, replacing any previous one.
    pub async fn register(
        &self,
        task_type: TaskType,
        executor: Arc<dyn Executor>,
    ) -> Result<(), ExecutorError> {
        if !executor.supports(task_type) {
            return Err(ExecutorError::Unsupported {
                executor: executor.name().to_string(),
                task_type,
            });
        }

        debug!(kind = %task_type, executor = executor.name(), "registered executor");
        self.executors.write().await.insert(task_type, executor);
        Ok(())
    }

    /// Remove the executor registered for a type.
    pub async fn unregister(&self, task_type: TaskType) -> Option<Arc<dyn Executor>> {
        self.executors.write().await.remove(&task_type)
    }

    /// Replace the fallback executor.
    pub async fn set_default(&self, executor: Arc<dyn Executor>) {
        *self.default.write().await = executor;
    }

    pub async fn default_executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&*self.default.read().await)
    }

    /// Executor for a task type: the registered one, or the default.
    pub async fn get_executor(&self, task_type: TaskType) -> Arc<dyn Executor> {
        if let Some(executor) = self.executors.read().await.get(&task_type) {
            return Arc::clone(executor);
        }

        let default = self.default_executor().await;
        warn!(
            kind = %task_type,
            executor = default.name(),
            "no executor registered for task type, using default"
        );
        default
    }

    /// Whether a type has its own executor.
    pub async fn is_registered(&self, task_type: TaskType) -> bool {
        self.executors.read().await.contains_key(&task_type)
    }

    /// Types with their own executor.
    pub async fn registered_types(&self) -> Vec<TaskType> {
        let executors = self.executors.read().await;
        TaskType::ALL
            .into_iter()
            .filter(|t| executors.contains_key(t))
            .collect()
    }
}

impl Default for ExecutorManager {
    fn default() -> Self {
        Self::new()
    }
}
