use survey_sync::error::StoreError;
use survey_sync::storage::{KeyValueStore, MemoryStore};

#[test]
fn clones_share_entries() {
    let a = MemoryStore::new();
    let b = a.clone();
    a.set_item("k", "v").unwrap();
    assert_eq!(b.get_item("k").unwrap().as_deref(), Some("v"));
    b.remove_item("k").unwrap();
    assert!(a.is_empty());
}

#[test]
fn keys_lists_everything() {
    let store = MemoryStore::with_entries([("b", "2"), ("a", "1")]);
    assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
}

#[test]
fn unavailable_store_errors_on_every_operation() {
    let store = MemoryStore::with_entries([("k", "v")]);
    store.set_unavailable(true);
    assert!(matches!(store.get_item("k"), Err(StoreError::Unavailable(_))));
    assert!(store.set_item("k", "w").is_err());
    assert!(store.remove_item("k").is_err());
    assert!(store.keys().is_err());
    assert_eq!(store.len(), 1, "contents untouched");
}
