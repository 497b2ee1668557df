//! Common test utilities shared across integration tests.

use stagehand::{
    CacheConfig, EngineConfig, EventBus, Executor, ExecutorManager, Task, TaskEngine, TaskType,
};
use std::sync::Arc;
use std::time::Duration;

/// Engine config with fast retries and no background sweeper.
pub fn fast_config(max_concurrency: usize, retry_attempts: u32) -> EngineConfig {
    EngineConfig {
        max_concurrency,
        retry_attempts,
        retry_delay_ms: 5,
        cache: CacheConfig {
            sweep_interval_ms: None,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Engine that runs every task with `executor`.
pub fn engine_with(config: EngineConfig, executor: Arc<dyn Executor>) -> TaskEngine {
    let cache = Arc::new(stagehand::CacheManager::new(
        config.cache.max_size,
        config.cache.default_ttl(),
    ));
    TaskEngine::with_components(
        config,
        cache,
        Arc::new(ExecutorManager::with_default(executor)),
        Arc::new(EventBus::new()),
    )
    .unwrap()
}

/// A task of type `custom` depending on `deps`.
pub fn task(id: &str, deps: &[&str]) -> Task {
    Task::builder(id, TaskType::Custom)
        .depends_on(deps.iter().copied())
        .build()
}

/// Poll `condition` every millisecond until it holds.
///
/// # Panics
///
/// Panics if the condition does not hold within `timeout`.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while !condition().await {
        if start.elapsed() > timeout {
            panic!("Timeout after {:?} waiting for condition", timeout);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
