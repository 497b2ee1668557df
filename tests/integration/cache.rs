//! Result caching across engine runs.

use crate::common::{engine_with, fast_config};
use stagehand::cache::generate_cache_key;
use stagehand::testing::{RecordingHandler, ScriptedExecutor};
use stagehand::{CacheManager, CacheOptions, Task, TaskId, TaskResult, TaskType};
use std::sync::Arc;
use std::time::Duration;

fn cached_task(id: &str, command: &str) -> Task {
    Task::builder(id, TaskType::Build)
        .command(command)
        .env("PROFILE", "release")
        .cached()
        .build()
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let executor = Arc::new(ScriptedExecutor::succeeding("compiled"));
    let engine = engine_with(fast_config(2, 0), executor.clone());
    let handler = RecordingHandler::new();
    engine.event_bus().register(handler.clone()).await;

    let first = engine
        .execute(vec![cached_task("build", "make")])
        .await
        .unwrap();
    let second = engine
        .execute(vec![cached_task("build", "make")])
        .await
        .unwrap();

    assert_eq!(executor.call_count().await, 1);
    assert_eq!(first, second);
    assert_eq!(handler.count("task:cached").await, 1);

    let stats = engine.cache().stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_changed_command_reruns() {
    let executor = Arc::new(ScriptedExecutor::succeeding("out"));
    let engine = engine_with(fast_config(2, 0), executor.clone());

    engine
        .execute(vec![cached_task("build", "make")])
        .await
        .unwrap();
    engine
        .execute(vec![cached_task("build", "make -j8")])
        .await
        .unwrap();

    // Same identity, different config: the stale entry is replaced.
    assert_eq!(executor.call_count().await, 2);
    assert_eq!(engine.cache().len().await, 1);
}

#[tokio::test]
async fn test_uncached_tasks_always_run() {
    let executor = Arc::new(ScriptedExecutor::succeeding(""));
    let engine = engine_with(fast_config(2, 0), executor.clone());
    let plain = Task::builder("lint", TaskType::Lint).command("clippy").build();

    engine.execute(vec![plain.clone()]).await.unwrap();
    engine.execute(vec![plain]).await.unwrap();

    assert_eq!(executor.call_count().await, 2);
    assert!(engine.cache().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_reruns() {
    let executor = Arc::new(ScriptedExecutor::succeeding("fresh"));
    let engine = engine_with(fast_config(2, 0), executor.clone());
    let short_lived = Task::builder("gen", TaskType::Custom)
        .cache(CacheOptions {
            key: None,
            ttl: Some(Duration::from_secs(10)),
        })
        .build();

    engine.execute(vec![short_lived.clone()]).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    engine.execute(vec![short_lived]).await.unwrap();

    assert_eq!(executor.call_count().await, 2);
}

#[tokio::test]
async fn test_single_slot_evicts_oldest() {
    let cache = CacheManager::new(1, Duration::from_secs(60));
    let k1 = cached_task("k1", "one");
    let k2 = cached_task("k2", "two");
    let result = TaskResult::success("r", Duration::ZERO);

    cache.set(&k1, &result).await.unwrap();
    cache.set(&k2, &result).await.unwrap();

    assert!(cache.get(&k1).await.unwrap().is_none());
    assert_eq!(cache.get(&k2).await.unwrap(), Some(result));
    assert_eq!(cache.stats().await.evictions, 1);
}

#[tokio::test]
async fn test_invalidate_by_key_pattern() {
    let executor = Arc::new(ScriptedExecutor::succeeding("x"));
    let engine = engine_with(fast_config(2, 0), executor.clone());
    let a = cached_task("a", "make a");
    let b = cached_task("b", "make b");

    engine.execute(vec![a.clone(), b.clone()]).await.unwrap();
    let key_a = generate_cache_key(&a).unwrap();

    let removed = engine
        .cache()
        .invalidate(Some(&format!("^{}$", key_a)))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    engine.execute(vec![a, b]).await.unwrap();

    assert_eq!(executor.calls_for("a").await, 2);
    assert_eq!(executor.calls_for("b").await, 1);
    assert!(engine.cache().invalidate(Some("(")).await.is_err());
}

#[tokio::test]
async fn test_results_keyed_by_task_id() {
    let executor = Arc::new(ScriptedExecutor::succeeding("same"));
    let engine = engine_with(fast_config(2, 0), executor);

    let results = engine
        .execute(vec![cached_task("x", "run"), cached_task("y", "run")])
        .await
        .unwrap();

    assert!(results.contains_key(&TaskId::new("x")));
    assert!(results.contains_key(&TaskId::new("y")));
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_refreshes_ttl() {
    let executor = Arc::new(ScriptedExecutor::succeeding("fresh"));
    let engine = engine_with(fast_config(2, 0), executor.clone());
    let task = Task::builder("gen", TaskType::Custom)
        .cache(CacheOptions {
            key: None,
            ttl: Some(Duration::from_secs(10)),
        })
        .build();

    engine.execute(vec![task.clone()]).await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;
    engine.execute(vec![task.clone()]).await.unwrap();
    // 12s after the first run, but only 4s after the last hit.
    tokio::time::advance(Duration::from_secs(4)).await;
    engine.execute(vec![task]).await.unwrap();

    assert_eq!(executor.call_count().await, 1);
    assert_eq!(engine.cache().stats().await.hits, 2);
}
