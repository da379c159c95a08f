//! In-memory `RemoteStore` with a version column and failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::RemoteError;
use crate::sync::types::{RemoteStore, UpsertOutcome};
use crate::types::{RecordPatch, RemoteRecord};

#[derive(Default)]
struct Inner {
    rows: HashMap<String, RemoteRecord>,
    upserts: Vec<(String, RecordPatch)>,
    fetches: usize,
    fetch_failures: VecDeque<RemoteError>,
    upsert_failures: VecDeque<RemoteError>,
}

/// Remote rows held in process. Clones share state, like two devices
/// talking to the same server.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a row as-is.
    pub fn insert(&self, record: RemoteRecord) {
        self.inner
            .lock()
            .rows
            .insert(record.survey_id.clone(), record);
    }

    pub fn record(&self, survey_id: &str) -> Option<RemoteRecord> {
        self.inner.lock().rows.get(survey_id).cloned()
    }

    /// Number of upserts that reached the store, including rejected ones.
    pub fn upsert_count(&self) -> usize {
        self.inner.lock().upserts.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches
    }

    pub fn last_patch(&self) -> Option<RecordPatch> {
        self.inner.lock().upserts.last().map(|(_, p)| p.clone())
    }

    /// The next `fetch` fails with `error`. Calls queue up.
    pub fn fail_next_fetch(&self, error: RemoteError) {
        self.inner.lock().fetch_failures.push_back(error);
    }

    /// The next `upsert` fails with `error` before touching the row.
    pub fn fail_next_upsert(&self, error: RemoteError) {
        self.inner.lock().upsert_failures.push_back(error);
    }

    /// Simulate another session writing: merge `patch` and bump the version.
    pub fn write_externally(&self, survey_id: &str, patch: &RecordPatch) -> Option<i64> {
        let mut inner = self.inner.lock();
        let row = inner
            .rows
            .entry(survey_id.to_string())
            .or_insert_with(|| RemoteRecord::new(survey_id));
        merge(row, patch);
        row.version
    }
}

fn merge(row: &mut RemoteRecord, patch: &RecordPatch) {
    for (column, value) in patch {
        match column.as_str() {
            "survey_id" | "version" => {}
            "updated_at" => row.updated_at = value.as_str().map(str::to_string),
            _ => {
                row.columns.insert(column.clone(), value.clone());
            }
        }
    }
    row.version = Some(row.version.unwrap_or(0) + 1);
}

#[async_trait(?Send)]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, survey_id: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.fetches += 1;
        if let Some(err) = inner.fetch_failures.pop_front() {
            return Err(err);
        }
        Ok(inner.rows.get(survey_id).cloned())
    }

    async fn upsert(
        &self,
        survey_id: &str,
        patch: &RecordPatch,
        expected_version: Option<i64>,
    ) -> Result<UpsertOutcome, RemoteError> {
        let mut inner = self.inner.lock();
        inner.upserts.push((survey_id.to_string(), patch.clone()));
        if let Some(err) = inner.upsert_failures.pop_front() {
            return Err(err);
        }

        let current = inner.rows.get(survey_id).and_then(|r| r.version);
        if expected_version.is_some() && expected_version != current {
            return Ok(UpsertOutcome::Conflict {
                actual_version: current,
            });
        }

        let row = inner
            .rows
            .entry(survey_id.to_string())
            .or_insert_with(|| RemoteRecord::new(survey_id));
        merge(row, patch);
        Ok(UpsertOutcome::Written {
            version: row.version,
        })
    }
}
