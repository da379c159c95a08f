//! Tab identity and the cross-tab sync lock.
//!
//! Every tab gets a random identifier for the lifetime of its session
//! store. Tabs sharing one local store arbitrate the remote write through a
//! TTL lock record kept in that store; a record older than the TTL is
//! treated as abandoned by a crashed tab.

pub mod tab_id;
pub mod tab_lock;

pub use tab_id::get_or_create_tab_id;
pub use tab_lock::{
    acquire_lock, read_lock, refresh_lock, release_lock, LockLease, TabLock,
    DEFAULT_LOCK_REFRESH_MS, DEFAULT_LOCK_TTL_MS,
};
