//! Core identifier and classification types for the engine.
//!
//! These types provide type-safe identifiers for tasks and engine runs,
//! and the closed set of task types executors are keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task within a submitted task set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

/// Unique identifier for one call to `TaskEngine::execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl RunId {
    /// Generate a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of work a task performs.
///
/// Executors are registered per type; unknown combinations fall back to the
/// default executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Build,
    Test,
    Lint,
    Deploy,
    #[default]
    Custom,
}

impl TaskType {
    /// All declared task types, in declaration order.
    pub const ALL: [TaskType; 5] = [
        TaskType::Build,
        TaskType::Test,
        TaskType::Lint,
        TaskType::Deploy,
        TaskType::Custom,
    ];

    /// Lowercase name used in configuration files and digests.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Build => "build",
            TaskType::Test => "test",
            TaskType::Lint => "lint",
            TaskType::Deploy => "deploy",
            TaskType::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
