pub mod clock;
pub mod conflict;
pub mod engine;
pub mod scheduler;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{ConflictDetector, ConflictVerdict};
pub use engine::SyncEngine;
pub use scheduler::{SyncScheduler, SyncTicker};
pub use types::{
    HydrateOutcome, RemoteStore, SkipReason, SyncConfig, SyncEngineOptions, SyncOutcome,
    SyncTrigger, UpsertOutcome, DEFAULT_SYNC_INTERVAL_MS,
};
