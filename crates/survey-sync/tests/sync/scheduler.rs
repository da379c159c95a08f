//! SyncScheduler driven by a manual clock.

use std::sync::Arc;
use std::time::Duration;

use survey_sync::remote::MemoryRemoteStore;
use survey_sync::storage::MemoryStore;
use survey_sync::sync::{
    ManualClock, SyncEngine, SyncEngineOptions, SyncOutcome, SyncScheduler, SyncTicker,
    DEFAULT_SYNC_INTERVAL_MS,
};

fn engine(clock: &ManualClock, remote: &MemoryRemoteStore) -> Arc<SyncEngine> {
    let store = MemoryStore::with_entries([
        ("survey_id", "S1"),
        ("dimension1_data", r#"{"d1a":{"itemX":"Currently offer"}}"#),
    ]);
    let mut opts = SyncEngineOptions::new(
        Arc::new(store),
        Arc::new(MemoryStore::new()),
        Arc::new(remote.clone()),
    );
    opts.clock = Some(Arc::new(clock.clone()));
    Arc::new(SyncEngine::new(opts))
}

#[tokio::test]
async fn tick_runs_only_when_due() {
    let clock = ManualClock::new(0);
    let remote = MemoryRemoteStore::new();
    let scheduler = SyncScheduler::new(engine(&clock, &remote));
    assert_eq!(scheduler.ticker().interval_ms(), DEFAULT_SYNC_INTERVAL_MS);

    assert!(scheduler.tick().await.is_none(), "not started");
    scheduler.start();
    assert!(scheduler.tick().await.is_none());

    clock.advance(DEFAULT_SYNC_INTERVAL_MS);
    assert!(matches!(scheduler.tick().await, Some(SyncOutcome::Synced { .. })));
    assert!(scheduler.tick().await.is_none());

    clock.advance(DEFAULT_SYNC_INTERVAL_MS);
    assert_eq!(scheduler.tick().await, Some(SyncOutcome::Unchanged));
    assert_eq!(remote.upsert_count(), 1);
}

#[tokio::test]
async fn dispose_stops_ticking() {
    let clock = ManualClock::new(0);
    let remote = MemoryRemoteStore::new();
    let scheduler = SyncScheduler::new(engine(&clock, &remote));
    scheduler.start();
    scheduler.dispose();
    clock.advance(DEFAULT_SYNC_INTERVAL_MS * 2);

    assert!(scheduler.tick().await.is_none());
    scheduler.start();
    assert!(!scheduler.ticker().is_running());
}

#[tokio::test]
async fn run_loop_syncs_then_stops_on_shutdown() {
    let clock = ManualClock::new(0);
    let remote = MemoryRemoteStore::new();
    let engine = engine(&clock, &remote);
    let ticker = SyncTicker::new(0, Arc::new(clock.clone()));
    let scheduler = SyncScheduler::with_ticker(Arc::clone(&engine), ticker);

    scheduler
        .run(
            Duration::from_millis(5),
            tokio::time::sleep(Duration::from_millis(60)),
        )
        .await;

    assert_eq!(remote.upsert_count(), 1, "later ticks and unload are no-ops");
    assert!(!scheduler.ticker().is_running());
    assert!(!engine.is_dirty());
}
