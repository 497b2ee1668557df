//! The task model.
//!
//! A [`Task`] is plain data: an id, a type, the ids it depends on and the
//! configuration an executor needs to run it. Tasks carry no behavior; the
//! engine hands them to whichever [`Executor`](crate::Executor) is registered
//! for their type.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::environment::Environment;
use super::types::{TaskId, TaskType};

/// A unit of work submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the submitted task set.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Kind of work, used to pick an executor.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Ids of tasks that must finish before this one starts.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Execution configuration.
    #[serde(default)]
    pub config: TaskConfig,
}

/// Execution configuration for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Command line (or script) to run.
    pub command: Option<String>,
    /// Environment variables for the command.
    #[serde(default)]
    pub env: Environment,
    /// Working directory for the command.
    pub working_dir: Option<PathBuf>,
    /// Per-attempt timeout, overriding the engine default.
    #[serde(default, with = "option_millis")]
    pub timeout: Option<Duration>,
    /// Opt-in result caching.
    pub cache: Option<CacheOptions>,
}

/// Per-task caching options.
///
/// A task is cacheable only when this is present on its config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Extra identity component mixed into the cache key.
    pub key: Option<String>,
    /// Entry lifetime, overriding the cache default.
    #[serde(default, with = "option_millis")]
    pub ttl: Option<Duration>,
}

impl Task {
    /// Start building a task with the given id and type.
    pub fn builder(id: impl Into<String>, task_type: TaskType) -> TaskBuilder {
        TaskBuilder::new(id, task_type)
    }

    /// Whether this task opted into result caching.
    pub fn is_cacheable(&self) -> bool {
        self.config.cache.is_some()
    }
}

/// Fluent builder for [`Task`].
///
/// ```
/// use stagehand::{Task, TaskType};
/// use std::time::Duration;
///
/// let task = Task::builder("test", TaskType::Test)
///     .name("Unit tests")
///     .command("cargo test")
///     .depends_on(["build"])
///     .env("RUST_BACKTRACE", "1")
///     .timeout(Duration::from_secs(600))
///     .cached()
///     .build();
///
/// assert_eq!(task.dependencies.len(), 1);
/// assert!(task.is_cacheable());
/// ```
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// Create a builder; the name defaults to the id.
    pub fn new(id: impl Into<String>, task_type: TaskType) -> Self {
        let id = id.into();
        Self {
            task: Task {
                name: id.clone(),
                id: TaskId::new(id),
                task_type,
                dependencies: Vec::new(),
                config: TaskConfig::default(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.task.name = name.into();
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.task.config.command = Some(command.into());
        self
    }

    /// Add several dependencies, in order.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.task.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.task.config.env.set(key, value);
        self
    }

    pub fn environment(mut self, env: Environment) -> Self {
        self.task.config.env = env;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task.config.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.task.config.timeout = Some(timeout);
        self
    }

    /// Opt into caching with default key and TTL.
    pub fn cached(mut self) -> Self {
        self.task.config.cache = Some(CacheOptions::default());
        self
    }

    /// Opt into caching with explicit options.
    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.task.config.cache = Some(options);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Serde helper for optional durations stored as whole milliseconds.
pub(crate) mod option_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
