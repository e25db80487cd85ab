//! The spawned sync task and its effect on process shutdown.

use ferry_engine::testing::seeded_source;
use ferry_engine::{
    Document, MemoryStore, Phase, RecordStore, RetryConfig, Scheduler, SchedulerConfig, SyncEngine,
    SyncError,
};
use ferry_server::spawn_sync;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn halted_sync_cancels_shutdown() {
    let (clock, source) = seeded_source(&[10, 20]).await;
    let target = MemoryStore::new_shared(clock.clone());
    // A stale row makes the bootstrap emit collide on its id.
    target
        .insert(Document::new(json!({})).with_id("rec-0"))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let engine = SyncEngine::new(source, target)
        .with_clock(clock)
        .with_retry(RetryConfig::no_retry())
        .with_cancellation(shutdown.clone());
    let scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::from_millis(10)));
    let status = scheduler.subscribe();

    let result = spawn_sync(scheduler, shutdown.clone()).await.unwrap();

    assert!(matches!(result, Err(SyncError::BootstrapFailed { .. })));
    assert!(shutdown.is_cancelled());
    assert_eq!(status.borrow().phase, Phase::Stopped);
}

#[tokio::test]
async fn requested_shutdown_stops_sync_cleanly() {
    let (clock, source) = seeded_source(&[10, 20]).await;
    let shutdown = CancellationToken::new();
    let engine = SyncEngine::new(source, MemoryStore::new_shared(clock.clone()))
        .with_clock(clock)
        .with_retry(RetryConfig::no_retry())
        .with_cancellation(shutdown.clone());
    let scheduler = Scheduler::new(engine, SchedulerConfig::new(1, Duration::from_secs(60)));
    let mut status = scheduler.subscribe();

    let task = spawn_sync(scheduler, shutdown.clone());
    while status.borrow_and_update().cycle < 2 {
        status.changed().await.unwrap();
    }
    shutdown.cancel();

    let watermark = task.await.unwrap().unwrap();
    assert_eq!(watermark.last_synced_at(), 20);
    assert_eq!(status.borrow().phase, Phase::Stopped);
}
