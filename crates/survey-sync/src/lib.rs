//! Local-first persistence and sync for a multi-step survey.
//!
//! Answers are written to a local key-value store through a
//! [`WriteGateway`](storage::WriteGateway) that tracks whether anything
//! survey-relevant changed. A [`SyncEngine`](sync::SyncEngine) converges
//! that store with one remote row per respondent: cross-tab lock,
//! canonical fingerprint to skip no-op writes, version check to avoid
//! overwriting another session's work, column-wise upsert.

pub mod canonical;
pub mod collect;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod lock;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod types;

pub use error::{RemoteError, Result, StoreError, SyncError};
pub use sync::{SyncEngine, SyncEngineOptions, SyncOutcome, SyncTrigger};
