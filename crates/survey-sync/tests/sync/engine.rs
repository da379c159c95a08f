//! SyncEngine attempt state machine.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use survey_sync::canonical::ContentHasher;
use survey_sync::error::{RemoteError, Result, SyncError};
use survey_sync::remote::MemoryRemoteStore;
use survey_sync::storage::{KeyValueStore, MemoryStore, WriteGateway};
use survey_sync::sync::{
    RemoteStore, SkipReason, SyncEngine, SyncEngineOptions, SyncOutcome, SyncTrigger,
    UpsertOutcome,
};
use survey_sync::types::{RecordPatch, RemoteRecord};

use super::support::{Harness, SURVEY};

const D1: &str = r#"{"d1a": {"itemX": "Currently offer"}}"#;

fn patch(v: serde_json::Value) -> RecordPatch {
    v.as_object().cloned().unwrap()
}

// ============================================================================
// Wrapping transports
// ============================================================================

/// Another session writes between this tab's fetch and its upsert.
struct RacingRemote {
    inner: MemoryRemoteStore,
}

#[async_trait(?Send)]
impl RemoteStore for RacingRemote {
    async fn fetch(&self, id: &str) -> std::result::Result<Option<RemoteRecord>, RemoteError> {
        self.inner.fetch(id).await
    }

    async fn upsert(
        &self,
        id: &str,
        p: &RecordPatch,
        expected: Option<i64>,
    ) -> std::result::Result<UpsertOutcome, RemoteError> {
        self.inner
            .write_externally(id, &patch(json!({"dimension9_data": {"other": "device"}})));
        self.inner.upsert(id, p, expected).await
    }
}

/// Yields once inside `fetch`, so a second attempt can start meanwhile.
struct YieldingRemote {
    inner: MemoryRemoteStore,
}

#[async_trait(?Send)]
impl RemoteStore for YieldingRemote {
    async fn fetch(&self, id: &str) -> std::result::Result<Option<RemoteRecord>, RemoteError> {
        tokio::task::yield_now().await;
        self.inner.fetch(id).await
    }

    async fn upsert(
        &self,
        id: &str,
        p: &RecordPatch,
        expected: Option<i64>,
    ) -> std::result::Result<UpsertOutcome, RemoteError> {
        self.inner.upsert(id, p, expected).await
    }
}

/// The user keeps typing while the upsert is in flight.
struct EditingRemote {
    inner: MemoryRemoteStore,
    gateway: Mutex<Option<WriteGateway>>,
}

#[async_trait(?Send)]
impl RemoteStore for EditingRemote {
    async fn fetch(&self, id: &str) -> std::result::Result<Option<RemoteRecord>, RemoteError> {
        self.inner.fetch(id).await
    }

    async fn upsert(
        &self,
        id: &str,
        p: &RecordPatch,
        expected: Option<i64>,
    ) -> std::result::Result<UpsertOutcome, RemoteError> {
        if let Some(gw) = self.gateway.lock().take() {
            gw.set_item("dimension2_data", r#"{"late":"edit"}"#).unwrap();
        }
        self.inner.upsert(id, p, expected).await
    }
}

struct NoCrypto;

#[async_trait(?Send)]
impl ContentHasher for NoCrypto {
    async fn digest(&self, _text: &str) -> Result<String> {
        Err(SyncError::HashUnavailable("crypto.subtle is undefined".into()))
    }
}

// ============================================================================
// Happy path and the no-op invariant
// ============================================================================

#[tokio::test]
async fn first_sync_upserts_section_and_completion() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    assert!(h.engine.is_dirty());

    let outcome = h.engine.sync(SyncTrigger::Force).await;
    assert_eq!(outcome, SyncOutcome::Synced { version: Some(1) });
    assert_eq!(h.remote.upsert_count(), 1);

    let sent = h.remote.last_patch().unwrap();
    assert_eq!(sent.get("dimension1_data"), Some(&json!({"d1a": {"itemX": "Currently offer"}})));
    assert_eq!(sent.get("dimension1_complete"), Some(&json!(true)));
    assert!(sent.get("updated_at").and_then(|v| v.as_str()).is_some());

    assert!(!h.engine.is_dirty());
    assert_eq!(h.engine.last_seen_version(), Some(1));
    assert!(h.engine.last_fingerprint().is_some());
}

#[tokio::test]
async fn second_sync_without_writes_does_not_upsert() {
    let h = Harness::new();
    h.write("dimension1_data", D1);

    h.engine.sync(SyncTrigger::Force).await;
    let again = h.engine.sync(SyncTrigger::Interval).await;

    assert_eq!(again, SyncOutcome::Unchanged);
    assert_eq!(h.remote.upsert_count(), 1);
    assert_eq!(h.remote.fetch_count(), 1, "unchanged payload needs no remote read");
}

#[tokio::test]
async fn rewriting_identical_content_is_still_a_no_op() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.engine.sync(SyncTrigger::Force).await;

    h.write("dimension1_data", r#"{"d1a":{"itemX":"Currently offer"}}"#);
    assert_eq!(h.engine.sync(SyncTrigger::Force).await, SyncOutcome::Unchanged);
    assert_eq!(h.remote.upsert_count(), 1);
}

#[tokio::test]
async fn changed_answer_is_written_with_expected_version() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.engine.sync(SyncTrigger::Force).await;

    h.write("dimension1_data", r#"{"d1a":{"itemX":"Planning"}}"#);
    let outcome = h.engine.sync(SyncTrigger::RouteChange).await;
    assert_eq!(outcome, SyncOutcome::Synced { version: Some(2) });
    assert_eq!(h.remote.upsert_count(), 2);
}

#[tokio::test]
async fn upsert_leaves_remote_only_sections_intact() {
    let h = Harness::new();
    h.remote
        .write_externally(SURVEY, &patch(json!({"dimension5_data": {"d5": "remote"}})));
    h.write("assessment_version", "1");
    h.write("dimension1_data", D1);

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(2) }
    );
    let row = h.remote.record(SURVEY).unwrap();
    assert!(row.has_section_data("dimension5_data"));
    assert!(row.has_section_data("dimension1_data"));
}

#[tokio::test]
async fn empty_store_writes_nothing() {
    let h = Harness::new();
    assert_eq!(h.engine.sync(SyncTrigger::Interval).await, SyncOutcome::Unchanged);
    assert_eq!(h.remote.upsert_count(), 0);
}

// ============================================================================
// Skips and lock
// ============================================================================

#[tokio::test]
async fn no_survey_id_skips() {
    let h = Harness::with_store(MemoryStore::with_entries([("dimension1_data", D1)]));
    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Skipped {
            reason: SkipReason::NoIdentity
        }
    );
    assert_eq!(h.remote.upsert_count(), 0);
}

#[tokio::test]
async fn legacy_survey_id_key_is_used() {
    let h = Harness::with_store(MemoryStore::with_entries([
        ("login_Survey_id", "s-1"),
        ("dimension1_data", D1),
    ]));
    assert_eq!(h.engine.survey_id().as_deref(), Some("S1"));
    assert!(h.engine.force_sync_now().await);
}

#[tokio::test]
async fn lock_held_by_live_tab_defers() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.store
        .set_item(&h.lock_key(), &format!(r#"{{"tabId":"tab_other","ts":{}}}"#, super::support::T0))
        .unwrap();
    let events = h.record_events();

    assert_eq!(h.engine.sync(SyncTrigger::Interval).await, SyncOutcome::LockDenied);
    assert_eq!(h.remote.fetch_count(), 0);
    assert!(h.engine.is_dirty());
    assert_eq!(*events.lock(), vec!["lockDenied"]);
    assert!(h.store.get_item(&h.lock_key()).unwrap().unwrap().contains("tab_other"));
}

#[tokio::test]
async fn abandoned_lock_is_taken_over() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.store
        .set_item(&h.lock_key(), r#"{"tabId":"tab_crashed","ts":0}"#)
        .unwrap();
    assert!(matches!(
        h.engine.sync(SyncTrigger::Interval).await,
        SyncOutcome::Synced { .. }
    ));
    assert!(h.store.get_item(&h.lock_key()).unwrap().is_none());
}

#[tokio::test]
async fn lock_is_released_after_success() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.engine.sync(SyncTrigger::Force).await;
    assert!(h.store.get_item(&h.lock_key()).unwrap().is_none());
}

#[tokio::test]
async fn overlapping_attempts_in_one_tab_are_skipped() {
    let remote = MemoryRemoteStore::new();
    let h = Harness::build(
        MemoryStore::with_entries([("survey_id", SURVEY), ("dimension1_data", D1)]),
        remote.clone(),
        Arc::new(YieldingRemote { inner: remote }),
    );

    let (a, b) = tokio::join!(
        h.engine.sync(SyncTrigger::Interval),
        h.engine.sync(SyncTrigger::RouteChange)
    );
    assert_eq!(a, SyncOutcome::Synced { version: Some(1) });
    assert_eq!(
        b,
        SyncOutcome::Skipped {
            reason: SkipReason::InProgress
        }
    );
    assert_eq!(h.remote.upsert_count(), 1);

    // The guard resets once the attempt ends.
    h.write("dimension1_data", r#"{"x":1}"#);
    assert!(matches!(h.engine.sync(SyncTrigger::Force).await, SyncOutcome::Synced { .. }));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failed_upsert_keeps_dirty_and_retries() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.remote
        .fail_next_upsert(RemoteError::Transport("network down".into()));
    let events = h.record_events();

    let outcome = h.engine.sync(SyncTrigger::Interval).await;
    assert!(matches!(outcome, SyncOutcome::WriteFailed { ref error } if error.contains("network down")));
    assert!(h.engine.is_dirty());
    assert!(h.engine.last_fingerprint().is_none());
    assert!(h.store.get_item(&h.lock_key()).unwrap().is_none(), "lock leaked");
    assert_eq!(*events.lock(), vec!["started", "failed"]);

    assert_eq!(
        h.engine.sync(SyncTrigger::Interval).await,
        SyncOutcome::Synced { version: Some(1) }
    );
    assert!(!h.engine.is_dirty());
}

#[tokio::test]
async fn failed_fetch_releases_lock() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    h.remote.fail_next_fetch(RemoteError::Transport("timeout".into()));

    assert!(matches!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::WriteFailed { .. }
    ));
    assert_eq!(h.remote.upsert_count(), 0);
    assert!(h.store.get_item(&h.lock_key()).unwrap().is_none());
}

#[tokio::test]
async fn missing_crypto_aborts_attempt() {
    let store = MemoryStore::with_entries([("survey_id", SURVEY), ("dimension1_data", D1)]);
    let remote = MemoryRemoteStore::new();
    let mut opts = SyncEngineOptions::new(
        Arc::new(store.clone()),
        Arc::new(MemoryStore::new()),
        Arc::new(remote.clone()),
    );
    opts.hasher = Some(Arc::new(NoCrypto));
    let engine = SyncEngine::new(opts);
    engine.mark_dirty("test");

    let outcome = engine.sync(SyncTrigger::Force).await;
    assert!(matches!(outcome, SyncOutcome::WriteFailed { ref error } if error.contains("digest unavailable")));
    assert_eq!(remote.upsert_count(), 0);
    assert!(engine.is_dirty());
    assert!(store.get_item("sync_lock_S1").unwrap().is_none());
}

#[tokio::test]
async fn edit_during_write_stays_dirty() {
    let remote = MemoryRemoteStore::new();
    let transport = Arc::new(EditingRemote {
        inner: remote.clone(),
        gateway: Mutex::new(None),
    });
    let h = Harness::build(
        MemoryStore::with_entries([("survey_id", SURVEY)]),
        remote,
        transport.clone(),
    );
    *transport.gateway.lock() = Some(h.engine.gateway().clone());
    h.write("dimension1_data", D1);

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(1) }
    );
    assert!(h.engine.is_dirty(), "late edit must not be forgotten");

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(2) }
    );
    assert!(h.remote.last_patch().unwrap().contains_key("dimension2_data"));
    assert!(!h.engine.is_dirty());
}

#[tokio::test]
async fn edit_from_another_tab_during_write_stays_dirty() {
    let remote = MemoryRemoteStore::new();
    let transport = Arc::new(EditingRemote {
        inner: remote.clone(),
        gateway: Mutex::new(None),
    });
    let store = MemoryStore::with_entries([("survey_id", SURVEY)]);
    let h = Harness::build(store.clone(), remote, transport.clone());
    let other_tab = WriteGateway::new(Arc::new(store));
    *transport.gateway.lock() = Some(other_tab.clone());
    h.write("dimension1_data", D1);

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(1) }
    );
    assert!(!h.remote.record(SURVEY).unwrap().columns.contains_key("dimension2_data"));
    assert!(h.engine.is_dirty(), "other tab's edit was never written");
    assert!(other_tab.is_dirty());

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(2) }
    );
    assert!(h.remote.last_patch().unwrap().contains_key("dimension2_data"));
    assert!(!other_tab.is_dirty());
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn advanced_remote_version_is_flagged_not_overwritten() {
    let h = Harness::new();
    for n in 0..3 {
        h.remote
            .write_externally(SURVEY, &patch(json!({"dimension1_data": {"n": n}})));
    }
    h.write("assessment_version", "2");
    h.write("dimension1_data", D1);
    let events = h.record_events();

    let outcome = h.engine.sync(SyncTrigger::Force).await;
    assert_eq!(
        outcome,
        SyncOutcome::Conflict {
            local_version: Some(2),
            remote_version: Some(3)
        }
    );
    assert_eq!(h.remote.upsert_count(), 0);
    assert!(h.engine.has_conflict());
    assert!(h.engine.is_dirty());
    assert_eq!(*events.lock(), vec!["started", "conflict"]);
    assert_eq!(h.session.get_item("version_conflict").unwrap().as_deref(), Some("true"));
    assert!(h.store.get_item(&h.lock_key()).unwrap().is_none());
}

#[tokio::test]
async fn unknown_baseline_adopts_remote_version() {
    let h = Harness::new();
    h.remote
        .write_externally(SURVEY, &patch(json!({"firmographics_data": {"size": "big"}})));
    h.write("dimension1_data", D1);

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Synced { version: Some(2) }
    );
    assert!(!h.engine.has_conflict());
}

#[tokio::test]
async fn write_time_race_is_flagged() {
    let remote = MemoryRemoteStore::new();
    remote.write_externally(SURVEY, &patch(json!({"dimension1_data": {"n": 0}})));
    let h = Harness::build(
        MemoryStore::with_entries([
            ("survey_id", SURVEY),
            ("assessment_version", "1"),
            ("dimension1_data", D1),
        ]),
        remote.clone(),
        Arc::new(RacingRemote { inner: remote }),
    );

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Conflict {
            local_version: Some(1),
            remote_version: Some(2)
        }
    );
    assert!(h.engine.has_conflict());
    assert!(h.engine.last_fingerprint().is_none());
}

// ============================================================================
// Triggers, events, lifecycle
// ============================================================================

#[tokio::test]
async fn route_change_syncs_only_on_new_paths() {
    let h = Harness::new();
    h.write("dimension1_data", D1);

    assert!(h.engine.on_route_change("").await.is_none());
    assert!(
        h.engine.on_route_change("/survey/dimension1").await.is_none(),
        "first page load is recorded, not synced"
    );
    assert_eq!(h.remote.upsert_count(), 0);
    assert!(h.engine.on_route_change("/survey/dimension1").await.is_none());
    assert!(matches!(
        h.engine.on_route_change("/survey/dimension2").await,
        Some(SyncOutcome::Synced { .. })
    ));
    assert_eq!(
        h.engine.on_route_change("/survey/dimension3").await,
        Some(SyncOutcome::Unchanged)
    );
}

#[tokio::test]
async fn unload_and_interval_are_ordinary_attempts() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    assert!(matches!(h.engine.on_unload().await, SyncOutcome::Synced { .. }));
    assert_eq!(h.engine.on_interval().await, SyncOutcome::Unchanged);
}

#[tokio::test]
async fn events_follow_attempt_and_unsubscribe_stops_them() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = h.engine.subscribe(move |ev| sink.lock().push(ev.name()));

    h.engine.sync(SyncTrigger::Force).await;
    h.engine.sync(SyncTrigger::Force).await;
    assert_eq!(*seen.lock(), vec!["started", "succeeded", "started", "unchanged"]);

    h.engine.unsubscribe(id);
    h.engine.sync(SyncTrigger::Force).await;
    assert_eq!(seen.lock().len(), 4);
}

#[tokio::test]
async fn disposed_engine_skips() {
    let h = Harness::new();
    h.write("dimension1_data", D1);
    let events = h.record_events();
    h.engine.dispose();

    assert_eq!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Skipped {
            reason: SkipReason::Disposed
        }
    );
    assert!(events.lock().is_empty());
    assert_eq!(h.remote.upsert_count(), 0);
}

#[tokio::test]
async fn stale_session_clear_resets_conflict() {
    let h = Harness::new();
    h.session.set_item("version_conflict", "true").unwrap();
    h.write("dimension1_data", D1);
    let events = h.record_events();

    assert!(h.engine.clear_stale_session("S2"));
    assert!(!h.engine.has_conflict());
    assert_eq!(h.engine.survey_id().as_deref(), Some("S2"));
    assert!(h.store.get_item("dimension1_data").unwrap().is_none());
    assert_eq!(*events.lock(), vec!["sessionCleared"]);
    assert!(!h.engine.clear_stale_session("S2"));
}
