/// Storage handle traits for survey-sync.
///
/// `KeyValueStore` is the narrow string-keyed, string-valued interface of a
/// per-origin browser store (`localStorage`, `sessionStorage`) or any
/// substitute. Every piece of shared mutable state the sync layer keeps
/// (dirty flag, lock record, last-synced fingerprint) lives behind one of
/// these handles, never in a module-level singleton.
use crate::error::StoreError;

/// Synchronous string key-value store.
///
/// Implementors must be `Send + Sync` so they can be shared through `Arc`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of all keys currently present.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
