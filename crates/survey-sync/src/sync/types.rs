//! Sync-side types: the remote store seam, triggers, outcomes, options.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::canonical::ContentHasher;
use crate::error::RemoteError;
use crate::lock::{DEFAULT_LOCK_REFRESH_MS, DEFAULT_LOCK_TTL_MS};
use crate::storage::keys::{LOCK_KEY_PREFIX, TAB_ID_KEY};
use crate::storage::KeyValueStore;
use crate::types::{RecordPatch, RemoteRecord};

use super::clock::Clock;

// ============================================================================
// RemoteStore: the durable row per respondent
// ============================================================================

/// Result of an upsert that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Columns merged; `version` is the row's new version, if it has one.
    Written { version: Option<i64> },
    /// The row's version no longer matched the expected one. Nothing written.
    Conflict { actual_version: Option<i64> },
}

/// Remote record store addressed by survey id.
///
/// `?Send` because the browser host drives futures on a single thread.
#[async_trait(?Send)]
pub trait RemoteStore {
    /// Read the full row, `None` if none exists yet.
    async fn fetch(&self, survey_id: &str) -> Result<Option<RemoteRecord>, RemoteError>;

    /// Insert or merge `patch` into the row. Columns absent from the patch
    /// are left untouched. When `expected_version` is `Some`, the write is
    /// applied only if the row is still at that version.
    async fn upsert(
        &self,
        survey_id: &str,
        patch: &RecordPatch,
        expected_version: Option<i64>,
    ) -> Result<UpsertOutcome, RemoteError>;
}

// ============================================================================
// Triggers and outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncTrigger {
    Interval,
    RouteChange,
    Force,
    Unload,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Interval => "interval",
            SyncTrigger::RouteChange => "routeChange",
            SyncTrigger::Force => "force",
            SyncTrigger::Unload => "unload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// No survey id is known yet; there is no row to write.
    NoIdentity,
    /// Another attempt from this tab is still running.
    InProgress,
    Disposed,
}

/// How one sync attempt ended. Failures are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncOutcome {
    LockDenied,
    Skipped { reason: SkipReason },
    /// Nothing to write: the payload matches the last synced fingerprint
    /// or is empty.
    Unchanged,
    Synced { version: Option<i64> },
    #[serde(rename_all = "camelCase")]
    Conflict {
        local_version: Option<i64>,
        remote_version: Option<i64>,
    },
    /// Dirty flag left set; the next trigger retries.
    WriteFailed { error: String },
}

impl SyncOutcome {
    /// True for outcomes after which local and remote agree.
    pub fn is_settled(&self) -> bool {
        matches!(self, SyncOutcome::Unchanged | SyncOutcome::Synced { .. })
    }
}

/// Result of pulling the remote row into the local store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum HydrateOutcome {
    Hydrated {
        version: Option<i64>,
        sections: usize,
    },
    /// Local answers exist; they were kept and only the version recorded.
    KeptLocal { version: Option<i64> },
    NotFound,
    Skipped { reason: SkipReason },
    Failed { error: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Tunables, deserializable from a host-provided JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub lock_ttl_ms: i64,
    pub lock_refresh_ms: i64,
    pub sync_interval_ms: i64,
    pub lock_key_prefix: String,
    pub tab_id_key: String,
}

pub const DEFAULT_SYNC_INTERVAL_MS: i64 = 30_000;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            lock_refresh_ms: DEFAULT_LOCK_REFRESH_MS,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            lock_key_prefix: LOCK_KEY_PREFIX.to_string(),
            tab_id_key: TAB_ID_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn lock_key(&self, survey_id: &str) -> String {
        format!("{}{survey_id}", self.lock_key_prefix)
    }
}

/// Everything a [`SyncEngine`](super::SyncEngine) is built from.
pub struct SyncEngineOptions {
    /// Shared local store (`localStorage`). The engine wraps it in a
    /// [`WriteGateway`](crate::storage::WriteGateway).
    pub store: Arc<dyn KeyValueStore>,
    /// Per-tab store (`sessionStorage`): tab id and conflict flag.
    pub session: Arc<dyn KeyValueStore>,
    pub remote: Arc<dyn RemoteStore>,
    /// Digest primitive (default: in-process SHA-256)
    pub hasher: Option<Arc<dyn ContentHasher>>,
    /// Time source (default: system clock)
    pub clock: Option<Arc<dyn Clock>>,
    /// Fixed survey id. When `None` it is read from the local store on
    /// every attempt.
    pub survey_id: Option<String>,
    pub config: Option<SyncConfig>,
}

impl SyncEngineOptions {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            store,
            session,
            remote,
            hasher: None,
            clock: None,
            survey_id: None,
            config: None,
        }
    }
}
