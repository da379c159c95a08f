//! Listener registry behind the sync event stream.
//!
//! `emit` clones the current listener handles and drops the lock before
//! calling any of them. A listener may therefore subscribe or unsubscribe
//! from inside its own callback: removals take effect after the current
//! event, additions from the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`EventEmitter::on`], accepted by [`EventEmitter::off`].
pub type ListenerId = u64;

pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

struct Registry<T> {
    next_id: ListenerId,
    /// Ordered by id, so listeners run in subscription order.
    listeners: BTreeMap<ListenerId, Arc<ListenerFn<T>>>,
}

pub struct EventEmitter<T> {
    registry: Mutex<Registry<T>>,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 1,
                listeners: BTreeMap::new(),
            }),
        }
    }

    /// Subscribe `callback` to every subsequent event.
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(callback));
        id
    }

    /// Unsubscribe. Unknown or already removed ids are ignored.
    pub fn off(&self, id: ListenerId) {
        self.registry.lock().listeners.remove(&id);
    }

    pub fn emit(&self, event: &T) {
        let listeners: Vec<_> = self.registry.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every listener; used when the engine is disposed.
    pub fn clear(&self) {
        self.registry.lock().listeners.clear();
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
