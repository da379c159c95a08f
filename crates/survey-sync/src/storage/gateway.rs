//! WriteGateway: the single write path into the shared local store.
//!
//! Application code writes survey answers through the gateway, and the
//! gateway is itself a [`KeyValueStore`], so any component handed an
//! `Arc<dyn KeyValueStore>` built from it is observed as well. A write or
//! removal of a survey-relevant key (see [`keys::is_sync_key`]) raises the
//! persisted dirty flag, whichever caller performed it.
//!
//! The flag is only ever cleared by the sync engine after a confirmed
//! remote write, and only if no tab sharing the store edited a sync key
//! while that write was in flight. Each observed edit bumps a revision
//! counter persisted next to the flag (`dirty_rev`), so an edit made by
//! another tab is seen as well.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::StoreError;

use super::keys::{self, DIRTY_KEY, DIRTY_REV_KEY};
use super::traits::KeyValueStore;

const DIRTY_VALUE: &str = "true";

#[derive(Clone)]
pub struct WriteGateway {
    store: Arc<dyn KeyValueStore>,
    /// In-process mirror of the flag, consulted when the store can't be read.
    dirty: Arc<AtomicBool>,
    /// Live [`HydrationGuard`] count; writes during hydration are not edits.
    hydrating: Arc<AtomicUsize>,
    /// Bumped on every observed edit of a sync key by this process.
    generation: Arc<AtomicU64>,
}

/// Edit counters captured before a remote write, see
/// [`WriteGateway::clear_dirty_since`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditGeneration {
    /// Persisted revision; `None` when the store could not be read.
    shared: Option<u64>,
    local: u64,
}

impl WriteGateway {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let persisted = matches!(store.get_item(DIRTY_KEY), Ok(Some(ref v)) if v == DIRTY_VALUE);
        Self {
            store,
            dirty: Arc::new(AtomicBool::new(persisted)),
            hydrating: Arc::new(AtomicUsize::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The raw store behind the gateway. Writes made here are not observed.
    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Dirty flag
    // -----------------------------------------------------------------------

    pub fn mark_dirty(&self, reason: &str) {
        self.dirty.store(true, Ordering::SeqCst);
        match self.store.set_item(DIRTY_KEY, DIRTY_VALUE) {
            Ok(()) => tracing::debug!(reason, "marked dirty"),
            Err(e) => tracing::warn!(
                reason,
                error = %e,
                "could not persist dirty flag; tracking in memory only"
            ),
        }
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
        if let Err(e) = self.store.remove_item(DIRTY_KEY) {
            tracing::warn!(error = %e, "could not clear persisted dirty flag");
        }
    }

    /// Clear the flag only if no sync key was edited, by this or any other
    /// tab, since `since` was captured. Returns whether the flag was cleared.
    ///
    /// An edit that lands while a remote write is in flight is not part of
    /// that write and must stay dirty. If the revision could not be read at
    /// either end the flag is kept.
    pub fn clear_dirty_since(&self, since: EditGeneration) -> bool {
        let now = self.generation();
        if now != since || now.shared.is_none() {
            tracing::debug!(?since, ?now, "edits arrived during sync; keeping dirty flag");
            return false;
        }
        self.clear_dirty();
        true
    }

    /// Current edit counters, for [`clear_dirty_since`](Self::clear_dirty_since).
    pub fn generation(&self) -> EditGeneration {
        EditGeneration {
            shared: self.shared_revision().ok(),
            local: self.generation.load(Ordering::SeqCst),
        }
    }

    fn shared_revision(&self) -> Result<u64, StoreError> {
        Ok(self
            .store
            .get_item(DIRTY_REV_KEY)?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0))
    }

    fn bump_revision(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let next = match self.shared_revision() {
            Ok(rev) => rev.wrapping_add(1),
            Err(e) => {
                tracing::debug!(error = %e, "edit revision unreadable");
                return;
            }
        };
        if let Err(e) = self.store.set_item(DIRTY_REV_KEY, &next.to_string()) {
            tracing::warn!(error = %e, "could not persist edit revision");
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self.store.get_item(DIRTY_KEY) {
            Ok(value) => value.as_deref() == Some(DIRTY_VALUE),
            Err(_) => self.dirty.load(Ordering::SeqCst),
        }
    }

    // -----------------------------------------------------------------------
    // Hydration guard
    // -----------------------------------------------------------------------

    /// Suppress dirty marking until the returned guard is dropped.
    ///
    /// Used while copying remote state into the local store: those writes
    /// reproduce what the server already has.
    pub fn begin_hydration(&self) -> HydrationGuard {
        self.hydrating.fetch_add(1, Ordering::SeqCst);
        HydrationGuard {
            hydrating: Arc::clone(&self.hydrating),
        }
    }

    pub fn is_hydrating(&self) -> bool {
        self.hydrating.load(Ordering::SeqCst) > 0
    }

    fn observe(&self, key: &str, action: &str) {
        if keys::is_sync_key(key) && !self.is_hydrating() {
            self.bump_revision();
            self.mark_dirty(&format!("{action}:{key}"));
        }
    }
}

impl KeyValueStore for WriteGateway {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set_item(key, value)?;
        self.observe(key, "write");
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove_item(key)?;
        self.observe(key, "remove");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys()
    }
}

/// RAII token returned by [`WriteGateway::begin_hydration`].
pub struct HydrationGuard {
    hydrating: Arc<AtomicUsize>,
}

impl Drop for HydrationGuard {
    fn drop(&mut self) {
        self.hydrating.fetch_sub(1, Ordering::SeqCst);
    }
}
