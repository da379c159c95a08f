pub mod emitter;
pub mod event;

pub use emitter::{EventEmitter, ListenerId};
pub use event::SyncEvent;
