use serde::Serialize;

use crate::sync::types::SyncTrigger;

/// Notifications published by the sync engine.
///
/// Serialized with a `type` tag so a JS host can switch on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Lock held, collection about to start.
    Started { trigger: SyncTrigger },
    /// Another tab holds the lock; the attempt was deferred.
    LockDenied { trigger: SyncTrigger },
    /// Fingerprint matched the last synced one; nothing written.
    Unchanged,
    #[serde(rename_all = "camelCase")]
    Succeeded {
        version: Option<i64>,
        fingerprint: String,
    },
    /// The write failed and will be retried on the next trigger.
    Failed { error: String },
    #[serde(rename_all = "camelCase")]
    Conflict {
        local_version: Option<i64>,
        remote_version: Option<i64>,
    },
    ConflictResolved { version: Option<i64> },
    /// Local store was populated from the remote record.
    Hydrated { version: Option<i64> },
    /// The active survey changed and the previous session's keys were removed.
    #[serde(rename_all = "camelCase")]
    SessionCleared { survey_id: String },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Started { .. } => "started",
            SyncEvent::LockDenied { .. } => "lockDenied",
            SyncEvent::Unchanged => "unchanged",
            SyncEvent::Succeeded { .. } => "succeeded",
            SyncEvent::Failed { .. } => "failed",
            SyncEvent::Conflict { .. } => "conflict",
            SyncEvent::ConflictResolved { .. } => "conflictResolved",
            SyncEvent::Hydrated { .. } => "hydrated",
            SyncEvent::SessionCleared { .. } => "sessionCleared",
        }
    }
}
