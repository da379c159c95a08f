//! Remote → local: resume hydration and conflict resolution.

use serde_json::json;

use survey_sync::error::RemoteError;
use survey_sync::storage::{KeyValueStore, MemoryStore};
use survey_sync::sync::{HydrateOutcome, SkipReason, SyncOutcome, SyncTrigger};
use survey_sync::types::RecordPatch;

use super::support::{Harness, SURVEY};

fn patch(v: serde_json::Value) -> RecordPatch {
    v.as_object().cloned().unwrap()
}

fn seed_remote(h: &Harness) {
    h.remote.write_externally(
        SURVEY,
        &patch(json!({
            "dimension3_data": {"d3a": "remote"},
            "dimension3_complete": true,
            "company_name": "Acme"
        })),
    );
}

#[tokio::test]
async fn empty_local_store_is_hydrated_and_next_sync_is_a_no_op() {
    let h = Harness::new();
    seed_remote(&h);
    let events = h.record_events();

    assert_eq!(
        h.engine.hydrate_from_remote().await,
        HydrateOutcome::Hydrated {
            version: Some(1),
            sections: 1
        }
    );
    assert!(!h.engine.is_dirty());
    assert_eq!(h.engine.last_seen_version(), Some(1));
    assert!(h.store.get_item("dimension3_data").unwrap().is_some());
    assert_eq!(*events.lock(), vec!["hydrated"]);

    assert_eq!(h.engine.sync(SyncTrigger::Interval).await, SyncOutcome::Unchanged);
    assert_eq!(h.remote.upsert_count(), 0);
}

#[tokio::test]
async fn local_answers_are_not_overwritten() {
    let h = Harness::new();
    seed_remote(&h);
    h.write("dimension1_data", r#"{"local":true}"#);

    assert_eq!(
        h.engine.hydrate_from_remote().await,
        HydrateOutcome::KeptLocal { version: Some(1) }
    );
    assert!(h.store.get_item("dimension3_data").unwrap().is_none());
    assert_eq!(h.engine.last_seen_version(), Some(1), "baseline recorded");
    assert!(h.engine.is_dirty());
}

#[tokio::test]
async fn missing_row_and_identity_are_reported() {
    let h = Harness::new();
    assert_eq!(h.engine.hydrate_from_remote().await, HydrateOutcome::NotFound);

    let anon = Harness::with_store(MemoryStore::new());
    assert_eq!(
        anon.engine.hydrate_from_remote().await,
        HydrateOutcome::Skipped {
            reason: SkipReason::NoIdentity
        }
    );
}

#[tokio::test]
async fn fetch_failure_is_an_outcome() {
    let h = Harness::new();
    h.remote.fail_next_fetch(RemoteError::Transport("offline".into()));
    assert!(matches!(
        h.engine.hydrate_from_remote().await,
        HydrateOutcome::Failed { .. }
    ));
}

#[tokio::test]
async fn resolving_a_conflict_adopts_server_state() {
    let h = Harness::new();
    seed_remote(&h);
    seed_remote(&h);
    h.write("assessment_version", "1");
    h.write("dimension1_data", r#"{"local":"only"}"#);

    assert!(matches!(
        h.engine.sync(SyncTrigger::Force).await,
        SyncOutcome::Conflict { .. }
    ));
    assert!(h.engine.has_conflict());

    let events = h.record_events();
    assert_eq!(
        h.engine.resolve_conflict_from_server().await,
        HydrateOutcome::Hydrated {
            version: Some(2),
            sections: 1
        }
    );
    assert!(!h.engine.has_conflict());
    assert!(!h.engine.is_dirty());
    assert!(h.store.get_item("dimension1_data").unwrap().is_none());
    assert!(h.store.get_item("dimension3_data").unwrap().is_some());
    assert_eq!(*events.lock(), vec!["hydrated", "conflictResolved"]);

    assert_eq!(h.engine.sync(SyncTrigger::Force).await, SyncOutcome::Unchanged);
    assert_eq!(h.remote.upsert_count(), 0);
}
