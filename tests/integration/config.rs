//! Task files driving the engine end to end.

use crate::common::engine_with;
use stagehand::testing::ScriptedExecutor;
use stagehand::{ConfigError, DependencyResolver, ResolveError, TaskFileLoader, TaskId, TaskType};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const PIPELINE: &str = r#"
engine:
  max_concurrency: 2
  retry_attempts: 1
  retry_delay_ms: 1
  cache:
    sweep_interval_ms: null
tasks:
  - id: fetch
    command: git fetch
  - id: build
    type: build
    command: cargo build
    depends_on: [fetch]
    cache: {}
  - id: lint
    type: lint
    command: cargo clippy
    depends_on: [fetch]
  - id: test
    type: test
    command: cargo test
    depends_on: [build, lint]
    timeout_ms: 60000
"#;

fn write_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_loaded_file_runs_in_dependency_order() {
    let file = write_file(PIPELINE);
    let task_file = TaskFileLoader::load(file.path()).unwrap();
    let config = task_file.engine_config();
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.retry_delay(), Duration::from_millis(1));
    assert!(config.cache.sweep_interval().is_none());

    let executor = Arc::new(ScriptedExecutor::succeeding("ok"));
    let engine = engine_with(config, executor.clone());

    let results = engine.execute(task_file.into_tasks()).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| r.is_success()));

    let calls = executor.calls().await;
    let position = |id: &str| calls.iter().position(|c| c.as_str() == id).unwrap();
    assert_eq!(position("fetch"), 0);
    assert!(position("build") < position("test"));
    assert!(position("lint") < position("test"));
}

#[test]
fn test_plan_groups_independent_tasks() {
    let task_file = TaskFileLoader::parse(PIPELINE).unwrap();

    let stages = DependencyResolver::resolve(task_file.into_tasks()).unwrap();

    let ids: Vec<Vec<&str>> = stages
        .iter()
        .map(|stage| {
            let mut ids: Vec<&str> = stage.iter().map(|t| t.id.as_str()).collect();
            ids.sort();
            ids
        })
        .collect();
    assert_eq!(ids, vec![vec!["fetch"], vec!["build", "lint"], vec!["test"]]);
}

#[test]
fn test_task_types_and_options_survive_loading() {
    let task_file = TaskFileLoader::parse(PIPELINE).unwrap();
    let tasks = task_file.to_tasks();

    let build = tasks.iter().find(|t| t.id == TaskId::new("build")).unwrap();
    assert_eq!(build.task_type, TaskType::Build);
    assert!(build.is_cacheable());

    let fetch = tasks.iter().find(|t| t.id == TaskId::new("fetch")).unwrap();
    assert_eq!(fetch.task_type, TaskType::Custom);
    assert!(!fetch.is_cacheable());
}

#[test]
fn test_cycle_in_file_is_rejected() {
    let file = write_file(
        r#"
tasks:
  - id: a
    depends_on: [c]
  - id: b
    depends_on: [a]
  - id: c
    depends_on: [b]
"#,
    );

    let err = TaskFileLoader::load(file.path()).unwrap_err();

    assert!(matches!(
        err,
        ConfigError::Graph(ResolveError::CircularDependency(_))
    ));
}

#[test]
fn test_invalid_engine_settings_are_rejected() {
    let file = write_file(
        r#"
engine:
  default_timeout_ms: 0
tasks:
  - id: a
"#,
    );

    assert!(matches!(
        TaskFileLoader::load(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_malformed_yaml_names_the_file() {
    let file = write_file("tasks:\n  - id: [unclosed\n");

    let err = TaskFileLoader::load(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::YamlFileError { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
