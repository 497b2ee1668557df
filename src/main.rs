//! stagehand - run dependency-ordered tasks from a YAML file.
//!
//! Usage:
//!   stagehand run <FILE>       Run every task in the file
//!   stagehand validate <FILE>  Check the file and its dependency graph
//!   stagehand plan <FILE>      Print the stages the tasks would run in

use clap::{Parser, Subcommand};
use stagehand::{
    DependencyResolver, Event, EventHandler, TaskEngine, TaskFile, TaskFileLoader, TaskId,
    TaskResult,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// stagehand - a task orchestration engine
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tasks in a task file
    Run {
        /// Path to the task file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Maximum concurrent tasks (overrides the file)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Retries after a failed attempt (overrides the file)
        #[arg(long)]
        retries: Option<u32>,

        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a task file without running it
    Validate {
        /// Path to the task file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the execution stages of a task file
    Plan {
        /// Path to the task file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Logs lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::TaskStart { task, .. } => {
                info!("Task '{}' started", task.id);
            }
            Event::TaskCached { task, .. } => {
                info!("Task '{}' served from cache", task.id);
            }
            Event::TaskSuccess { task, result, .. } => {
                info!("Task '{}' succeeded in {:?}", task.id, result.duration);
                let out = result.output.trim();
                for line in out.lines() {
                    info!("    stdout: {}", line);
                }
            }
            Event::TaskFailed {
                task,
                error,
                result,
                ..
            } => {
                warn!(
                    "Task '{}' failed (exit: {}): {}",
                    task.id, result.exit_code, error
                );
            }
            Event::TaskRetrying {
                task,
                attempt,
                max_attempts,
                error,
                ..
            } => {
                warn!(
                    "Task '{}' attempt {}/{} failed, retrying: {}",
                    task.id, attempt, max_attempts, error
                );
            }
            Event::TaskCancelled { task, .. } => {
                warn!("Task '{}' cancelled", task.id);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            jobs,
            retries,
            json,
        } => {
            run_tasks(file, jobs, retries, json).await?;
        }
        Commands::Validate { file } => {
            validate_file(file)?;
        }
        Commands::Plan { file } => {
            plan_file(file)?;
        }
    }

    Ok(())
}

/// Run every task in a file and report the results.
async fn run_tasks(
    file: PathBuf,
    jobs: Option<usize>,
    retries: Option<u32>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading tasks from: {}", file.display());
    let task_file = TaskFileLoader::load(&file)?;

    let mut config = task_file.engine_config();
    if let Some(jobs) = jobs {
        config.max_concurrency = jobs;
    }
    if let Some(retries) = retries {
        config.retry_attempts = retries;
    }

    let engine = TaskEngine::new(config)?;
    engine.event_bus().register(Arc::new(LoggingHandler)).await;

    let tasks = task_file.into_tasks();
    info!(
        "Running {} task(s) with up to {} at a time",
        tasks.len(),
        engine.config().max_concurrency
    );

    let results: BTreeMap<TaskId, TaskResult> =
        engine.execute(tasks).await?.into_iter().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_summary(&results);
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|(_, result)| !result.is_success())
        .map(|(id, _)| id.as_str())
        .collect();
    if !failed.is_empty() {
        error!("{} task(s) failed: {}", failed.len(), failed.join(", "));
        return Err(format!("{} task(s) failed", failed.len()).into());
    }

    info!("All tasks succeeded");
    Ok(())
}

fn print_summary(results: &BTreeMap<TaskId, TaskResult>) {
    println!("Results:");
    for (id, result) in results {
        let status = if result.is_success() { "ok" } else { "FAILED" };
        println!(
            "  {:<24} {:<6} exit={:<4} {:?}",
            id.as_str(),
            status,
            result.exit_code,
            result.duration
        );
        if let Some(error) = &result.error {
            println!("      {}", error);
        }
    }
}

/// Validate a task file without running it.
fn validate_file(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating: {}", file.display());

    match TaskFileLoader::load(&file) {
        Ok(task_file) => {
            info!("All {} task(s) are valid", task_file.tasks.len());
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Print the resolved stages of a task file.
fn plan_file(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let task_file: TaskFile = TaskFileLoader::load(&file)?;
    let stages = DependencyResolver::resolve(task_file.into_tasks())?;

    println!("Plan for {}:", file.display());
    println!();

    for (index, stage) in stages.iter().enumerate() {
        println!("Stage {}:", index + 1);
        for task in stage {
            if task.dependencies.is_empty() {
                println!("  - {} [{}]", task.id, task.task_type);
            } else {
                let deps: Vec<&str> = task.dependencies.iter().map(|d| d.as_str()).collect();
                println!(
                    "  - {} [{}] (depends on: {})",
                    task.id,
                    task.task_type,
                    deps.join(", ")
                );
            }
        }
    }

    Ok(())
}
