//! Task outcomes and transient execution state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::types::TaskId;

/// Outcome of running a task, including all of its attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Process-style exit code; zero means success.
    pub exit_code: i32,
    /// Captured output.
    pub output: String,
    /// Error message for failed results.
    pub error: Option<String>,
    /// Wall-clock duration.
    #[serde(with = "millis")]
    pub duration: Duration,
    /// Paths or identifiers of produced artifacts.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Named numeric measurements reported by the executor.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl TaskResult {
    /// Create a successful result with the given output.
    pub fn success(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
            error: None,
            duration,
            ..Default::default()
        }
    }

    /// Create a failed result.
    ///
    /// An exit code of zero is coerced to 1 so that a failure can never be
    /// mistaken for a success.
    pub fn failure(exit_code: i32, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code: if exit_code == 0 { 1 } else { exit_code },
            output: String::new(),
            error: Some(error.into()),
            duration,
            ..Default::default()
        }
    }

    /// Builder: attach captured output.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Builder: add an artifact.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }

    /// Builder: record a metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lifecycle status of a task inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Task is executing (or waiting on a cache lookup).
    Running,
    /// Task completed successfully or was served from cache.
    Success,
    /// Task failed after all attempts.
    Failed,
    /// Task was cancelled while running.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// Transient state of a task while the engine runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: TaskId,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of executor invocations made so far.
    pub attempts: u32,
    pub result: Option<TaskResult>,
}

impl TaskExecution {
    /// Begin tracking a task that is starting now.
    pub fn start(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            attempts: 0,
            result: None,
        }
    }

    /// Record the final result.
    ///
    /// A cancelled execution keeps its `Cancelled` status.
    pub fn finish(&mut self, status: ExecutionStatus, result: TaskResult) {
        if self.status != ExecutionStatus::Cancelled {
            self.status = status;
        }
        self.end_time = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ExecutionStatus::Cancelled
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
