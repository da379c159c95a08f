use std::sync::Arc;

use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::sync::clock::Clock;
use crate::types::LockRecord;

/// Age after which a held lock is treated as abandoned.
pub const DEFAULT_LOCK_TTL_MS: i64 = 30_000;

/// How often a holder should refresh during long operations.
pub const DEFAULT_LOCK_REFRESH_MS: i64 = 10_000;

// ============================================================================
// Free functions
// ============================================================================

/// Read and decode the lock record. An undecodable record reads as `None`
/// (nobody can prove ownership of it, so it is as good as abandoned).
pub fn read_lock(store: &dyn KeyValueStore, lock_key: &str) -> Result<Option<LockRecord>, StoreError> {
    let raw = store.get_item(lock_key)?;
    Ok(raw.and_then(|raw| match serde_json::from_str::<LockRecord>(&raw) {
        Ok(rec) => Some(rec),
        Err(e) => {
            tracing::debug!(lock_key, error = %e, "ignoring undecodable lock record");
            None
        }
    }))
}

/// Try to take the lock for `tab_id`.
///
/// Succeeds when there is no record, the record is ours, or it is older
/// than `ttl_ms`; the record is then rewritten with `now_ms`. Returns
/// `false` while another live tab holds it.
///
/// If the store itself is unusable this fails open and returns `true`:
/// syncing without cross-tab exclusion beats not syncing at all.
pub fn acquire_lock(
    store: &dyn KeyValueStore,
    lock_key: &str,
    tab_id: &str,
    ttl_ms: i64,
    now_ms: i64,
) -> bool {
    let current = match read_lock(store, lock_key) {
        Ok(current) => current,
        Err(e) => {
            tracing::warn!(lock_key, tab_id, error = %e, "lock storage unavailable; failing open");
            return true;
        }
    };

    if let Some(rec) = current {
        let expired = rec.timestamp.map_or(true, |ts| is_abandoned(ts, ttl_ms, now_ms));
        let mine = rec.tab_id == tab_id;
        if !expired && !mine {
            tracing::debug!(lock_key, tab_id, holder = %rec.tab_id, "lock held by another tab");
            return false;
        }
        if expired && !mine {
            tracing::info!(lock_key, tab_id, previous = %rec.tab_id, "reclaiming abandoned lock");
        }
    }

    if let Err(e) = write_record(store, lock_key, tab_id, now_ms) {
        tracing::warn!(lock_key, tab_id, error = %e, "could not write lock record; failing open");
    }
    true
}

/// Rewrite the record's timestamp. Ownership is not re-checked; call only
/// while holding the lock.
pub fn refresh_lock(store: &dyn KeyValueStore, lock_key: &str, tab_id: &str, now_ms: i64) {
    if let Err(e) = write_record(store, lock_key, tab_id, now_ms) {
        tracing::debug!(lock_key, error = %e, "lock refresh failed");
    }
}

/// Delete the record, but only if `tab_id` owns it.
pub fn release_lock(store: &dyn KeyValueStore, lock_key: &str, tab_id: &str) {
    match read_lock(store, lock_key) {
        Ok(Some(rec)) if rec.tab_id == tab_id => {
            if let Err(e) = store.remove_item(lock_key) {
                tracing::debug!(lock_key, error = %e, "lock release failed");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(lock_key, error = %e, "lock release skipped"),
    }
}

/// A record older than `ttl_ms`, or stamped further in the future than
/// `ttl_ms` (clock skew or a corrupt value), no longer blocks anyone.
fn is_abandoned(ts: i64, ttl_ms: i64, now_ms: i64) -> bool {
    ts > now_ms.saturating_add(ttl_ms) || now_ms.saturating_sub(ts) > ttl_ms
}

fn write_record(
    store: &dyn KeyValueStore,
    lock_key: &str,
    tab_id: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let rec = LockRecord {
        tab_id: tab_id.to_string(),
        timestamp: Some(now_ms),
    };
    let raw = serde_json::to_string(&rec)
        .map_err(|e| StoreError::Unavailable(format!("lock record encode: {e}")))?;
    store.set_item(lock_key, &raw)
}

// ============================================================================
// TabLock
// ============================================================================

/// A named lock bound to one tab identity, store, and clock.
#[derive(Clone)]
pub struct TabLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    tab_id: String,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl TabLock {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        tab_id: impl Into<String>,
        ttl_ms: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            tab_id: tab_id.into(),
            ttl_ms,
            clock,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn acquire(&self) -> bool {
        acquire_lock(
            self.store.as_ref(),
            &self.key,
            &self.tab_id,
            self.ttl_ms,
            self.clock.now_ms(),
        )
    }

    /// Acquire and return a lease that releases the lock when dropped.
    pub fn try_lease(&self) -> Option<LockLease<'_>> {
        self.acquire().then_some(LockLease { lock: self })
    }

    pub fn refresh(&self) {
        refresh_lock(self.store.as_ref(), &self.key, &self.tab_id, self.clock.now_ms());
    }

    pub fn release(&self) {
        release_lock(self.store.as_ref(), &self.key, &self.tab_id);
    }

    /// Current record, if any.
    pub fn holder(&self) -> Option<LockRecord> {
        read_lock(self.store.as_ref(), &self.key).ok().flatten()
    }
}

/// Held lock. Released on drop, on every exit path.
pub struct LockLease<'a> {
    lock: &'a TabLock,
}

impl LockLease<'_> {
    pub fn refresh(&self) {
        self.lock.refresh();
    }
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
