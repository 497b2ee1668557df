//! Scheduler admission under concurrent load.

use crate::common::{task, wait_until};
use stagehand::{Admission, CancelOutcome, EventBus, TaskId, TaskScheduler};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_burst_never_exceeds_capacity() {
    let scheduler = Arc::new(TaskScheduler::new(3));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for i in 0..20 {
        let scheduler = Arc::clone(&scheduler);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        workers.push(tokio::spawn(async move {
            let task = task(&format!("t{}", i), &[]);
            let id = task.id.clone();
            let ticket = scheduler.schedule(task, i % 4).await.unwrap();
            assert_eq!(ticket.admitted().await, Admission::Started);

            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(scheduler.stats().await.running <= 3);
            tokio::time::sleep(Duration::from_millis(2)).await;
            active.fetch_sub(1, Ordering::SeqCst);

            assert!(scheduler.complete(&id).await);
        }));
    }

    for worker in workers {
        worker.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = scheduler.stats().await;
    assert_eq!(stats.running, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.utilization, 0.0);
}

#[tokio::test]
async fn test_growing_capacity_admits_waiting_tasks() {
    let scheduler = Arc::new(TaskScheduler::new(1));
    let _first = scheduler.schedule(task("first", &[]), 0).await.unwrap();
    let second = scheduler.schedule(task("second", &[]), 0).await.unwrap();

    let waiter = tokio::spawn(second.admitted());
    assert_eq!(scheduler.adjust_concurrency(1).await, 2);

    assert_eq!(waiter.await.unwrap(), Admission::Started);
    assert_eq!(scheduler.stats().await.utilization, 1.0);
}

#[tokio::test]
async fn test_cancel_publishes_events() {
    let bus = Arc::new(EventBus::new());
    let handler = stagehand::testing::RecordingHandler::new();
    bus.register(handler.clone()).await;
    let scheduler = TaskScheduler::new(1).with_event_bus(Arc::clone(&bus));

    let _running = scheduler.schedule(task("running", &[]), 0).await.unwrap();
    let queued = scheduler.schedule(task("queued", &[]), 0).await.unwrap();

    assert_eq!(
        scheduler.cancel(&TaskId::new("running")).await,
        CancelOutcome::CancellationRequested
    );
    assert_eq!(
        scheduler.cancel(&TaskId::new("queued")).await,
        CancelOutcome::Dequeued
    );
    assert_eq!(queued.admitted().await, Admission::Cancelled);

    assert_eq!(
        handler.names().await,
        vec!["task:cancel-requested", "task:cancelled"]
    );
}

#[tokio::test]
async fn test_pause_holds_new_work() {
    let scheduler = Arc::new(TaskScheduler::new(2));
    scheduler.pause().await;
    let ticket = scheduler.schedule(task("later", &[]), 0).await.unwrap();
    let waiter = tokio::spawn(ticket.admitted());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    scheduler.resume(2).await;
    wait_until(Duration::from_secs(1), || {
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.running_count().await == 1 }
    })
    .await;
    assert_eq!(waiter.await.unwrap(), Admission::Started);
}
