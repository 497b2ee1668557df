//! Shell command executor.
//!
//! [`CommandExecutor`] is the generic default executor. It runs a task's
//! `command` through the platform shell (`sh -c` on Unix, `cmd /C` on
//! Windows) with the task's environment and working directory, and reports
//! the outcome as a [`TaskResult`]:
//!
//! - exit status zero: success, `output` holds stdout
//! - non-zero exit: `exit_code` is the process code, `error` carries stderr
//! - command cannot be started: `exit_code` 127 with the spawn error
//! - cancelled through [`Executor::cancel`]: `exit_code` 130
//!
//! A task without a command succeeds immediately with empty output.
//!
//! Children are spawned with `kill_on_drop`, so when the engine's timeout
//! drops an in-flight execution the process is killed rather than leaked,
//! and its cancellation handle is released with it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::result::TaskResult;
use crate::core::task::Task;
use crate::core::types::{TaskId, TaskType};

use super::executor::{Executor, ExecutorError};

/// Exit code reported when the command could not be started.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Exit code reported when a running command was cancelled.
pub const EXIT_CANCELLED: i32 = 130;

/// Runs task commands as child processes.
///
/// The same task id may run more than once at a time (for example from
/// overlapping engine runs); each execution is tracked under its own token.
#[derive(Default)]
pub struct CommandExecutor {
    /// Cancellation senders for commands currently running.
    running: Mutex<HashMap<(TaskId, u64), oneshot::Sender<()>>>,
    next_token: AtomicU64,
}

/// Untracks one execution when it finishes or its future is dropped.
struct Tracked<'a> {
    executor: &'a CommandExecutor,
    key: (TaskId, u64),
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.executor.senders().remove(&self.key);
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands currently running.
    pub async fn running_count(&self) -> usize {
        self.senders().len()
    }

    // Never held across an await, so a std mutex is enough.
    fn senders(&self) -> MutexGuard<'_, HashMap<(TaskId, u64), oneshot::Sender<()>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, task_id: &TaskId, sender: oneshot::Sender<()>) -> Tracked<'_> {
        let key = (
            task_id.clone(),
            self.next_token.fetch_add(1, Ordering::Relaxed),
        );
        self.senders().insert(key.clone(), sender);
        Tracked {
            executor: self,
            key,
        }
    }

    fn shell_command(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, task: &Task) -> Result<TaskResult, ExecutorError> {
        let start = Instant::now();

        let Some(command) = task.config.command.as_deref() else {
            debug!(task = %task.id, "no command configured, nothing to run");
            return Ok(TaskResult::success("", start.elapsed()));
        };

        let mut cmd = Self::shell_command(command);
        for (key, value) in task.config.env.iter() {
            cmd.env(key, value);
        }
        if let Some(ref dir) = task.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(task = %task.id, error = %e, "failed to start command");
                return Ok(TaskResult::failure(
                    EXIT_SPAWN_FAILED,
                    format!("failed to start command '{}': {}", command, e),
                    start.elapsed(),
                ));
            }
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let tracked = self.track(&task.id, cancel_tx);
        debug!(task = %task.id, command, "command started");

        // Dropping the wait future kills the child (kill_on_drop).
        let outcome = tokio::select! {
            output = child.wait_with_output() => Some(output),
            Ok(()) = &mut cancel_rx => None,
        };
        drop(tracked);

        let Some(output) = outcome else {
            debug!(task = %task.id, "command cancelled");
            return Ok(TaskResult::failure(
                EXIT_CANCELLED,
                "command cancelled",
                start.elapsed(),
            ));
        };
        let output = output?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let duration = start.elapsed();

        if output.status.success() {
            return Ok(TaskResult::success(stdout, duration));
        }

        // Terminated by a signal when there is no code.
        let code = output.status.code().unwrap_or(-1);
        let stderr = stderr.trim();
        let error = if stderr.is_empty() {
            format!("command exited with code {}", code)
        } else {
            format!("command exited with code {}: {}", code, stderr)
        };
        Ok(TaskResult::failure(code, error, duration).with_output(stdout))
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), ExecutorError> {
        let senders: Vec<oneshot::Sender<()>> = {
            let mut running = self.senders();
            let keys: Vec<(TaskId, u64)> = running
                .keys()
                .filter(|(id, _)| id == task_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| running.remove(key)).collect()
        };
        for sender in senders {
            // The command may have finished in the meantime.
            let _ = sender.send(());
        }
        Ok(())
    }

    fn supports(&self, _task_type: TaskType) -> bool {
        true
    }
}
