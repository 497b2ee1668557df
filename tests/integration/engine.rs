//! End-to-end engine runs.

use crate::common::{engine_with, fast_config, task, wait_until};
use stagehand::testing::{PendingExecutor, RecordingHandler, ScriptedExecutor};
use stagehand::{
    EngineError, Event, ExecutionStatus, ResolveError, Task, TaskId, TaskResult, TaskType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Position of each task in the executor's call order.
fn positions(calls: &[TaskId]) -> HashMap<String, usize> {
    calls
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str().to_string(), i))
        .collect()
}

#[tokio::test]
async fn test_diamond_runs_in_dependency_order() {
    let executor = Arc::new(ScriptedExecutor::succeeding("ok"));
    let engine = engine_with(fast_config(4, 0), executor.clone());

    let results = engine
        .execute(vec![
            task("d", &["b", "c"]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("a", &[]),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.values().all(TaskResult::is_success));

    let order = positions(&executor.calls().await);
    assert!(order["a"] < order["b"]);
    assert!(order["a"] < order["c"]);
    assert!(order["b"] < order["d"]);
    assert!(order["c"] < order["d"]);
}

#[tokio::test]
async fn test_later_stage_waits_for_slow_sibling() {
    let executor =
        Arc::new(ScriptedExecutor::succeeding("").with_delay(Duration::from_millis(20)));
    let engine = engine_with(fast_config(4, 0), executor.clone());
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    engine
        .execute(vec![
            task("fast", &[]),
            task("slow", &[]),
            task("after", &["fast"]),
        ])
        .await
        .unwrap();

    // "after" only starts once the whole first stage completed.
    let events = handler.events().await;
    let start_after = events
        .iter()
        .position(|e| e.name() == "task:start" && e.task().id.as_str() == "after")
        .unwrap();
    let complete_slow = events
        .iter()
        .position(|e| e.name() == "task:complete" && e.task().id.as_str() == "slow")
        .unwrap();
    assert!(complete_slow < start_after);
}

#[tokio::test]
async fn test_cycle_aborts_before_execution() {
    let executor = Arc::new(ScriptedExecutor::succeeding(""));
    let engine = engine_with(fast_config(4, 0), executor.clone());

    let result = engine
        .execute(vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])])
        .await;

    assert!(matches!(
        result,
        Err(EngineError::Resolve(ResolveError::CircularDependency(_)))
    ));
    assert_eq!(executor.call_count().await, 0);
}

#[tokio::test]
async fn test_self_dependency_aborts() {
    let engine = engine_with(fast_config(4, 0), Arc::new(ScriptedExecutor::succeeding("")));

    let result = engine.execute(vec![task("a", &["a"])]).await;

    assert!(matches!(
        result,
        Err(EngineError::Resolve(ResolveError::CircularDependency(id))) if id.as_str() == "a"
    ));
}

#[tokio::test]
async fn test_empty_run() {
    let engine = engine_with(fast_config(4, 0), Arc::new(ScriptedExecutor::succeeding("")));
    assert!(engine.execute(Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_count_and_final_failure() {
    let executor = Arc::new(ScriptedExecutor::failing("still broken"));
    let engine = engine_with(fast_config(4, 3), executor.clone());
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    let results = engine.execute(vec![task("flaky", &[])]).await.unwrap();

    let result = &results[&TaskId::new("flaky")];
    assert_eq!(executor.call_count().await, 4);
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.error.as_deref(), Some("still broken"));

    let retries: Vec<(u32, u32)> = handler
        .events()
        .await
        .iter()
        .filter_map(|event| match event {
            Event::TaskRetrying {
                attempt,
                max_attempts,
                ..
            } => Some((*attempt, *max_attempts)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(1, 4), (2, 4), (3, 4)]);
}

#[tokio::test]
async fn test_flaky_task_recovers() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        TaskResult::failure(2, "transient", Duration::ZERO),
        TaskResult::success("recovered", Duration::ZERO),
    ]));
    let engine = engine_with(fast_config(4, 2), executor.clone());
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    let results = engine.execute(vec![task("a", &[])]).await.unwrap();

    assert_eq!(results[&TaskId::new("a")].output, "recovered");
    assert_eq!(executor.call_count().await, 2);
    assert_eq!(
        handler.names_for("a").await,
        vec!["task:start", "task:retrying", "task:success", "task:complete"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_uses_engine_default() {
    let executor = Arc::new(PendingExecutor::new());
    let mut config = fast_config(4, 1);
    config.default_timeout_ms = 100;
    let engine = engine_with(config, executor.clone());

    let started = tokio::time::Instant::now();
    let results = engine.execute(vec![task("stuck", &[])]).await.unwrap();

    let result = &results[&TaskId::new("stuck")];
    assert!(!result.is_success());
    assert_eq!(result.error.as_deref(), Some("task timed out after 100ms"));
    // Two attempts of 100ms plus one retry delay.
    assert_eq!(executor.call_count().await, 2);
    assert!(started.elapsed() >= Duration::from_millis(205));
}

#[tokio::test]
async fn test_complete_event_carries_execution() {
    let engine = engine_with(fast_config(4, 0), Arc::new(ScriptedExecutor::succeeding("x")));
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    engine.execute(vec![task("a", &[])]).await.unwrap();

    let events = handler.events().await;
    let Some(Event::TaskComplete { execution, .. }) = events.last() else {
        panic!("Expected TaskComplete as last event");
    };
    assert_eq!(execution.task_id, TaskId::new("a"));
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.attempts, 1);
    assert_eq!(execution.result.as_ref().unwrap().output, "x");
    assert!(execution.end_time.unwrap() >= execution.start_time);
}

#[tokio::test]
async fn test_cancel_queued_task() {
    let executor = Arc::new(PendingExecutor::new());
    let mut config = fast_config(1, 0);
    config.default_timeout_ms = 300;
    let engine = Arc::new(engine_with(config, executor.clone()));
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    let run = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .execute(vec![task("first", &[]), task("second", &[])])
                .await
        })
    };

    wait_until(Duration::from_secs(5), || {
        let engine = Arc::clone(&engine);
        async move {
            let status = engine.status().await;
            status.running == 1 && status.queued == 1
        }
    })
    .await;

    // Whichever task was admitted first keeps running; the other is queued.
    let running = engine.scheduler().running().await;
    let queued = if running[0].as_str() == "first" {
        TaskId::new("second")
    } else {
        TaskId::new("first")
    };
    assert!(engine.cancel(&queued).await);
    assert!(engine.cancel(&running[0]).await);

    let results = run.await.unwrap().unwrap();
    assert!(results.values().all(|r| !r.is_success()));
    assert_eq!(executor.call_count().await, 1);
    assert_eq!(
        handler.names_for(queued.as_str()).await,
        vec!["task:cancelled", "task:complete"]
    );
    let queued_result = &results[&queued];
    assert_eq!(queued_result.exit_code, stagehand::execution::EXIT_CANCELLED);

    let settled = handler
        .events()
        .await
        .into_iter()
        .find_map(|event| match event {
            Event::TaskComplete { task, execution, .. } if task.id == queued => Some(execution),
            _ => None,
        })
        .unwrap();
    assert_eq!(settled.status, ExecutionStatus::Cancelled);
    assert_eq!(settled.attempts, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_builtin_executors_run_commands() {
    let engine = stagehand::TaskEngine::new(fast_config(2, 0)).unwrap();

    let results = engine
        .execute(vec![
            Task::builder("build", TaskType::Build)
                .command("echo built")
                .build(),
            Task::builder("test", TaskType::Test)
                .command("echo tested")
                .depends_on(["build"])
                .build(),
            Task::builder("fail", TaskType::Lint)
                .command("exit 4")
                .build(),
        ])
        .await
        .unwrap();

    assert_eq!(results[&TaskId::new("build")].output.trim(), "built");
    assert_eq!(results[&TaskId::new("test")].output.trim(), "tested");
    let fail = &results[&TaskId::new("fail")];
    assert_eq!(fail.exit_code, 1);
    assert!(fail.error.as_deref().unwrap().contains("code 4"));
}

#[tokio::test]
async fn test_overlapping_runs_reuse_task_ids() {
    let executor =
        Arc::new(ScriptedExecutor::succeeding("done").with_delay(Duration::from_millis(50)));
    let engine = engine_with(fast_config(4, 0), executor.clone());
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    let (first, second) = tokio::join!(
        engine.execute(vec![task("build", &[])]),
        engine.execute(vec![task("build", &[]), task("test", &["build"])]),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first[&TaskId::new("build")].is_success());
    assert!(second[&TaskId::new("build")].is_success());
    assert!(second[&TaskId::new("test")].is_success());

    assert_eq!(executor.calls_for("build").await, 2);
    assert_eq!(handler.count("task:start").await, 3);
    assert_eq!(handler.count("task:complete").await, 3);

    let status = engine.status().await;
    assert_eq!(status.running, 0);
    assert_eq!(status.queued, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_command_releases_tracking() {
    let command = Arc::new(stagehand::CommandExecutor::new());
    let mut config = fast_config(1, 0);
    config.default_timeout_ms = 100;
    let engine = engine_with(config, command.clone());

    let results = engine
        .execute(vec![
            Task::builder("slow", TaskType::Custom)
                .command("sleep 5")
                .build(),
        ])
        .await
        .unwrap();

    let result = &results[&TaskId::new("slow")];
    assert_eq!(result.error.as_deref(), Some("task timed out after 100ms"));
    assert_eq!(command.running_count().await, 0);
}
