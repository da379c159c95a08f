//! Detection of remote writes this client has not seen.
//!
//! The remote row carries a strictly monotonic `version`. The client keeps
//! the last version it observed; a remote version beyond that means some
//! other session wrote in between, and this client must not overwrite it.

use std::sync::Arc;

use crate::storage::keys::CONFLICT_KEY;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// Safe to write, conditioned on the row still being at `expected_version`.
    Clear { expected_version: Option<i64> },
    /// No local baseline yet: take the remote version as the baseline.
    AdoptBaseline { version: i64 },
    Conflict { local_version: i64, remote_version: i64 },
}

impl ConflictVerdict {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictVerdict::Conflict { .. })
    }
}

/// Session-scoped conflict flag plus the version comparison.
#[derive(Clone)]
pub struct ConflictDetector {
    session: Arc<dyn KeyValueStore>,
}

impl ConflictDetector {
    pub fn new(session: Arc<dyn KeyValueStore>) -> Self {
        Self { session }
    }

    pub fn check(last_seen: Option<i64>, remote: Option<i64>) -> ConflictVerdict {
        match (last_seen, remote) {
            (_, None) => ConflictVerdict::Clear {
                expected_version: None,
            },
            (None, Some(version)) => ConflictVerdict::AdoptBaseline { version },
            (Some(local_version), Some(remote_version)) if remote_version > local_version => {
                ConflictVerdict::Conflict {
                    local_version,
                    remote_version,
                }
            }
            (Some(_), Some(remote_version)) => ConflictVerdict::Clear {
                expected_version: Some(remote_version),
            },
        }
    }

    pub fn has_conflict(&self) -> bool {
        matches!(self.session.get_item(CONFLICT_KEY), Ok(Some(ref v)) if v == "true")
    }

    pub fn flag(&self, local_version: Option<i64>, remote_version: Option<i64>) {
        tracing::warn!(
            local_version = ?local_version,
            remote_version = ?remote_version,
            "remote record advanced past last seen version; flagging conflict"
        );
        if let Err(e) = self.session.set_item(CONFLICT_KEY, "true") {
            tracing::warn!(error = %e, "could not persist conflict flag");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.session.remove_item(CONFLICT_KEY) {
            tracing::debug!(error = %e, "could not clear conflict flag");
        }
    }
}
