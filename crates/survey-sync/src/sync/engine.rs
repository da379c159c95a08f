//! SyncEngine: one attempt at converging the local store with the remote
//! row, plus the triggers that start attempts.
//!
//! Per attempt: take the cross-tab lock, collect the local payload,
//! fingerprint it, skip the write if the fingerprint matches the last
//! synced one, check the remote version, upsert, then record the new
//! fingerprint and version and clear the dirty flag. The lock is held by a
//! [`LockLease`] and released on every exit path.
//!
//! Public methods never return `Err`; failures are reported as outcomes,
//! logged, and published on the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::canonical::{fingerprint, ContentHasher, Sha256Hasher};
use crate::collect::{
    clear_stale_session, local_has_section_data, HydrationReport, Hydrator, SectionCollector,
};
use crate::error::SyncError;
use crate::events::{EventEmitter, ListenerId, SyncEvent};
use crate::lock::{get_or_create_tab_id, LockLease, TabLock};
use crate::storage::keys::{
    LAST_FINGERPRINT_KEY, LEGACY_SURVEY_ID_KEY, SURVEY_ID_KEY, VERSION_KEY,
};
use crate::storage::{KeyValueStore, WriteGateway};
use crate::types::{normalize_survey_id, Fingerprint, RemoteRecord};

use super::clock::{to_rfc3339, Clock, SystemClock};
use super::conflict::{ConflictDetector, ConflictVerdict};
use super::types::{
    HydrateOutcome, RemoteStore, SkipReason, SyncConfig, SyncEngineOptions, SyncOutcome,
    SyncTrigger, UpsertOutcome,
};

const UPDATED_AT_COLUMN: &str = "updated_at";

pub struct SyncEngine {
    gateway: WriteGateway,
    session: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore>,
    hasher: Arc<dyn ContentHasher>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    fixed_survey_id: Option<String>,
    tab_id: String,
    collector: SectionCollector,
    hydrator: Hydrator,
    conflicts: ConflictDetector,
    events: EventEmitter<SyncEvent>,
    in_progress: AtomicBool,
    /// Last non-empty route seen by [`on_route_change`](Self::on_route_change).
    last_route: Mutex<Option<String>>,
    disposed: AtomicBool,
}

/// Resets the per-tab re-entrancy flag when an attempt ends.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(options: SyncEngineOptions) -> Self {
        let clock: Arc<dyn Clock> = options.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let config = options.config.unwrap_or_default();
        let tab_id = get_or_create_tab_id(options.session.as_ref(), &config.tab_id_key, clock.as_ref());
        let fixed_survey_id = options
            .survey_id
            .map(|id| normalize_survey_id(&id))
            .filter(|id| !id.is_empty());

        tracing::debug!(tab_id = %tab_id, "sync engine created");

        Self {
            gateway: WriteGateway::new(options.store),
            conflicts: ConflictDetector::new(Arc::clone(&options.session)),
            session: options.session,
            remote: options.remote,
            hasher: options.hasher.unwrap_or_else(|| Arc::new(Sha256Hasher)),
            clock,
            config,
            fixed_survey_id,
            tab_id,
            collector: SectionCollector::new(),
            hydrator: Hydrator::new(),
            events: EventEmitter::new(),
            in_progress: AtomicBool::new(false),
            last_route: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The write path application code must use for the local store.
    pub fn gateway(&self) -> &WriteGateway {
        &self.gateway
    }

    pub fn session(&self) -> &Arc<dyn KeyValueStore> {
        &self.session
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Normalized survey id, from the fixed option or the local store.
    pub fn survey_id(&self) -> Option<String> {
        if let Some(id) = &self.fixed_survey_id {
            return Some(id.clone());
        }
        [SURVEY_ID_KEY, LEGACY_SURVEY_ID_KEY]
            .iter()
            .filter_map(|key| self.gateway.get_item(key).ok().flatten())
            .map(|raw| normalize_survey_id(raw.trim()))
            .find(|id| !id.is_empty())
    }

    /// Lock bound to this tab for the given survey.
    pub fn lock_for(&self, survey_id: &str) -> TabLock {
        TabLock::new(
            Arc::clone(self.gateway.inner()),
            self.config.lock_key(survey_id),
            self.tab_id.clone(),
            self.config.lock_ttl_ms,
            Arc::clone(&self.clock),
        )
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Dirty / conflict passthroughs
    // -----------------------------------------------------------------------

    pub fn mark_dirty(&self, reason: &str) {
        self.gateway.mark_dirty(reason);
    }

    pub fn clear_dirty(&self) {
        self.gateway.clear_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.gateway.is_dirty()
    }

    pub fn has_conflict(&self) -> bool {
        self.conflicts.has_conflict()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.events.off(id);
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    pub async fn on_interval(&self) -> SyncOutcome {
        self.sync(SyncTrigger::Interval).await
    }

    /// Sync when navigation lands on a different path. The first path seen
    /// is only recorded (initial page load); repeated or empty paths also
    /// return `None` without an attempt.
    pub async fn on_route_change(&self, path: &str) -> Option<SyncOutcome> {
        if path.is_empty() {
            return None;
        }
        let previous = self.last_route.lock().replace(path.to_string());
        match previous.as_deref() {
            None => return None,
            Some(prev) if prev == path => return None,
            Some(_) => {}
        }
        Some(self.sync(SyncTrigger::RouteChange).await)
    }

    /// Best-effort attempt while the page goes away.
    pub async fn on_unload(&self) -> SyncOutcome {
        self.sync(SyncTrigger::Unload).await
    }

    /// Attempt now; `true` when local and remote agree afterwards.
    pub async fn force_sync_now(&self) -> bool {
        self.sync(SyncTrigger::Force).await.is_settled()
    }

    // -----------------------------------------------------------------------
    // Sync attempt
    // -----------------------------------------------------------------------

    pub async fn sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        if self.is_disposed() {
            return SyncOutcome::Skipped {
                reason: SkipReason::Disposed,
            };
        }
        if self.in_progress.swap(true, Ordering::SeqCst) {
            tracing::debug!(trigger = trigger.as_str(), "sync already in progress");
            return SyncOutcome::Skipped {
                reason: SkipReason::InProgress,
            };
        }
        let _running = InProgress(&self.in_progress);

        let Some(survey_id) = self.survey_id() else {
            tracing::debug!(trigger = trigger.as_str(), "no survey id; nothing to sync");
            return SyncOutcome::Skipped {
                reason: SkipReason::NoIdentity,
            };
        };

        let lock = self.lock_for(&survey_id);
        let Some(lease) = lock.try_lease() else {
            self.events.emit(&SyncEvent::LockDenied { trigger });
            return SyncOutcome::LockDenied;
        };

        tracing::debug!(
            survey_id = %survey_id,
            tab_id = %self.tab_id,
            trigger = trigger.as_str(),
            "sync started"
        );
        self.events.emit(&SyncEvent::Started { trigger });

        let result = self.attempt(&survey_id, &lease).await;
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    survey_id = %survey_id,
                    trigger = trigger.as_str(),
                    error = %e,
                    "sync failed; dirty flag kept for retry"
                );
                let error = e.to_string();
                self.events.emit(&SyncEvent::Failed {
                    error: error.clone(),
                });
                SyncOutcome::WriteFailed { error }
            }
        }
        // `lease` drops after the match and releases the lock.
    }

    async fn attempt(&self, survey_id: &str, lease: &LockLease<'_>) -> Result<SyncOutcome, SyncError> {
        let generation = self.gateway.generation();
        let collected = self.collector.collect(self.gateway.inner().as_ref())?;
        if collected.is_empty() {
            tracing::debug!(survey_id, "no local survey data");
            self.events.emit(&SyncEvent::Unchanged);
            return Ok(SyncOutcome::Unchanged);
        }

        let mut patch = collected.patch;
        let current = fingerprint(self.hasher.as_ref(), &Value::Object(patch.clone())).await?;
        lease.refresh();

        if self.last_fingerprint().as_ref() == Some(&current) {
            tracing::debug!(survey_id, fingerprint = %current, "payload unchanged; skipping write");
            self.events.emit(&SyncEvent::Unchanged);
            return Ok(SyncOutcome::Unchanged);
        }

        let remote = self.remote.fetch(survey_id).await?;
        lease.refresh();

        let last_seen = self.last_seen_version();
        let remote_version = remote.as_ref().and_then(|r| r.version);
        let expected_version = match ConflictDetector::check(last_seen, remote_version) {
            ConflictVerdict::Conflict {
                local_version,
                remote_version,
            } => return Ok(self.flag_conflict(Some(local_version), Some(remote_version))),
            ConflictVerdict::AdoptBaseline { version } => {
                tracing::info!(survey_id, version, "no local version baseline; adopting remote");
                self.store_version(version);
                Some(version)
            }
            ConflictVerdict::Clear { expected_version } => expected_version,
        };

        patch.insert(
            UPDATED_AT_COLUMN.to_string(),
            Value::String(to_rfc3339(self.clock.now_ms())),
        );

        let outcome = self
            .remote
            .upsert(survey_id, &patch, expected_version)
            .await?;
        lease.refresh();

        match outcome {
            UpsertOutcome::Conflict { actual_version } => {
                Ok(self.flag_conflict(expected_version, actual_version))
            }
            UpsertOutcome::Written { version } => {
                self.store_fingerprint(&current);
                if let Some(version) = version {
                    self.store_version(version);
                }
                self.gateway.clear_dirty_since(generation);
                tracing::info!(
                    survey_id,
                    version = ?version,
                    fingerprint = %current,
                    columns = patch.len(),
                    "sync succeeded"
                );
                self.events.emit(&SyncEvent::Succeeded {
                    version,
                    fingerprint: current.to_string(),
                });
                Ok(SyncOutcome::Synced { version })
            }
        }
    }

    fn flag_conflict(&self, local_version: Option<i64>, remote_version: Option<i64>) -> SyncOutcome {
        self.conflicts.flag(local_version, remote_version);
        self.events.emit(&SyncEvent::Conflict {
            local_version,
            remote_version,
        });
        SyncOutcome::Conflict {
            local_version,
            remote_version,
        }
    }

    // -----------------------------------------------------------------------
    // Remote → local
    // -----------------------------------------------------------------------

    /// Load the remote row on resume.
    ///
    /// Local answers win: if any section already has local data, only the
    /// remote version is recorded (when none is known yet). Otherwise the row
    /// is written into the local store without marking it dirty.
    pub async fn hydrate_from_remote(&self) -> HydrateOutcome {
        self.pull(false).await
    }

    /// Adopt the remote row after a conflict, replacing local section data,
    /// then clear the conflict and dirty flags.
    pub async fn resolve_conflict_from_server(&self) -> HydrateOutcome {
        let outcome = self.pull(true).await;
        if let HydrateOutcome::Hydrated { version, .. } = outcome {
            self.conflicts.clear();
            self.gateway.clear_dirty();
            tracing::info!(version = ?version, "conflict resolved from server");
            self.events.emit(&SyncEvent::ConflictResolved { version });
        }
        outcome
    }

    async fn pull(&self, replace: bool) -> HydrateOutcome {
        if self.is_disposed() {
            return HydrateOutcome::Skipped {
                reason: SkipReason::Disposed,
            };
        }
        let Some(survey_id) = self.survey_id() else {
            return HydrateOutcome::Skipped {
                reason: SkipReason::NoIdentity,
            };
        };
        match self.pull_inner(&survey_id, replace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(survey_id = %survey_id, error = %e, "could not load remote record");
                HydrateOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn pull_inner(&self, survey_id: &str, replace: bool) -> Result<HydrateOutcome, SyncError> {
        let Some(record) = self.remote.fetch(survey_id).await? else {
            tracing::debug!(survey_id, "no remote record yet");
            return Ok(HydrateOutcome::NotFound);
        };

        if !replace && local_has_section_data(self.gateway.inner().as_ref())? {
            if self.last_seen_version().is_none() {
                if let Some(version) = record.version {
                    self.store_version(version);
                }
            }
            tracing::debug!(survey_id, "local answers present; not overwriting from remote");
            return Ok(HydrateOutcome::KeptLocal {
                version: record.version,
            });
        }

        let report = self.adopt(&record, replace).await?;
        self.events.emit(&SyncEvent::Hydrated {
            version: report.version,
        });
        Ok(HydrateOutcome::Hydrated {
            version: report.version,
            sections: report.sections.len(),
        })
    }

    /// Write `record` locally and record it as the synced state.
    async fn adopt(&self, record: &RemoteRecord, replace: bool) -> Result<HydrationReport, SyncError> {
        if replace {
            self.hydrator.clear_sections(&self.gateway)?;
        }
        let report = self.hydrator.hydrate(&self.gateway, record)?;
        let collected = self.collector.collect(self.gateway.inner().as_ref())?;
        let synced = fingerprint(self.hasher.as_ref(), &Value::Object(collected.patch)).await?;
        self.store_fingerprint(&synced);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Switch the active survey. Returns `true` when the previous
    /// respondent's local data was removed.
    pub fn clear_stale_session(&self, new_survey_id: &str) -> bool {
        match clear_stale_session(&self.gateway, new_survey_id) {
            Ok(true) => {
                self.conflicts.clear();
                self.events.emit(&SyncEvent::SessionCleared {
                    survey_id: normalize_survey_id(new_survey_id),
                });
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(error = %e, "could not clear stale session");
                false
            }
        }
    }

    /// Stop accepting attempts and drop all listeners.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.events.clear();
            tracing::debug!(tab_id = %self.tab_id, "sync engine disposed");
        }
    }

    // -----------------------------------------------------------------------
    // Sync-state keys
    // -----------------------------------------------------------------------

    pub fn last_fingerprint(&self) -> Option<Fingerprint> {
        self.gateway
            .get_item(LAST_FINGERPRINT_KEY)
            .ok()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(Fingerprint::from_hex)
    }

    pub fn last_seen_version(&self) -> Option<i64> {
        self.gateway
            .get_item(VERSION_KEY)
            .ok()
            .flatten()
            .and_then(|s| s.trim().parse().ok())
    }

    fn store_fingerprint(&self, fp: &Fingerprint) {
        if let Err(e) = self.gateway.set_item(LAST_FINGERPRINT_KEY, fp.as_str()) {
            tracing::warn!(error = %e, "could not persist last synced fingerprint");
        }
    }

    fn store_version(&self, version: i64) {
        if let Err(e) = self.gateway.set_item(VERSION_KEY, &version.to_string()) {
            tracing::warn!(error = %e, "could not persist last seen version");
        }
    }
}
