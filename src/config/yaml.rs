//! YAML task files.
//!
//! A task file lists the tasks of one run and may carry engine settings:
//!
//! ```yaml
//! engine:
//!   max_concurrency: 2
//!   retry_attempts: 1
//! tasks:
//!   - id: build
//!     type: build
//!     command: cargo build
//!     cache:
//!       key: v1
//!   - id: test
//!     type: test
//!     command: cargo test
//!     depends_on: [build]
//!     timeout_ms: 600000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::environment::Environment;
use crate::core::resolver::DependencyGraph;
use crate::core::task::{CacheOptions, Task, TaskConfig};
use crate::core::types::{TaskId, TaskType};

use super::error::ConfigError;
use super::types::EngineConfig;

/// A parsed task file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    /// Engine settings; defaults apply when absent.
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    /// Task definitions, in file order.
    pub tasks: Vec<TaskDefinition>,
}

impl TaskFile {
    /// Engine settings from the file, or the defaults.
    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    /// Convert the definitions into tasks, keeping file order.
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
            .into_iter()
            .map(TaskDefinition::into_task)
            .collect()
    }

    /// Build tasks without consuming the file.
    pub fn to_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .cloned()
            .map(TaskDefinition::into_task)
            .collect()
    }
}

/// One task as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task identifier (unique within the file).
    pub id: String,
    /// Human-readable name; defaults to the id.
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    /// Opting into caching; `cache: {}` caches with defaults.
    pub cache: Option<CacheDefinition>,
}

/// Cache options as written in YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDefinition {
    pub key: Option<String>,
    pub ttl_ms: Option<u64>,
}

impl TaskDefinition {
    pub fn into_task(self) -> Task {
        let env: Environment = self.env.into_iter().collect();
        Task {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: TaskId::new(self.id),
            task_type: self.task_type,
            dependencies: self.depends_on.into_iter().map(TaskId::from).collect(),
            config: TaskConfig {
                command: self.command,
                env,
                working_dir: self.working_dir,
                timeout: self.timeout_ms.map(Duration::from_millis),
                cache: self.cache.map(|cache| CacheOptions {
                    key: cache.key,
                    ttl: cache.ttl_ms.map(Duration::from_millis),
                }),
            },
        }
    }
}

/// Loads and validates task files.
pub struct TaskFileLoader;

impl TaskFileLoader {
    /// Load a task file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<TaskFile, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;

        let file: TaskFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(&file)?;
        Ok(file)
    }

    /// Parse a task file from a YAML string.
    pub fn parse(yaml: &str) -> Result<TaskFile, ConfigError> {
        let file: TaskFile = serde_yaml::from_str(yaml)?;
        Self::validate(&file)?;
        Ok(file)
    }

    /// Validate a parsed task file.
    ///
    /// Checks the engine settings, the individual definitions and that the
    /// tasks form an acyclic graph with no dangling dependencies.
    pub fn validate(file: &TaskFile) -> Result<(), ConfigError> {
        if let Some(engine) = &file.engine {
            engine.validate()?;
        }

        if file.tasks.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "task file must define at least one task".into(),
            ));
        }

        for task in &file.tasks {
            if task.id.trim().is_empty() {
                return Err(ConfigError::MissingField("id".into()));
            }
            if task.timeout_ms == Some(0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has a zero timeout",
                    task.id
                )));
            }

            let mut seen = HashSet::new();
            for dep in &task.depends_on {
                if !seen.insert(dep) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "task '{}' has duplicate dependency '{}'",
                        task.id, dep
                    )));
                }
            }
        }

        let graph = DependencyGraph::build(file.to_tasks())?;
        graph.validate()?;
        Ok(())
    }
}
