use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failure of the local key-value medium itself (blocked, quota, detached).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Local store unavailable: {0}")]
    Unavailable(String),

    #[error("Local store quota exceeded while writing \"{key}\"")]
    QuotaExceeded { key: String },
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failure talking to the remote record store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote transport error: {0}")]
    Transport(String),

    #[error("Remote record not found for survey \"{0}\"")]
    NotFound(String),

    #[error("Remote store rejected the write: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// SyncError (top-level rollup)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No cryptographic digest primitive in the host. Fatal to hashing only.
    #[error("Cryptographic digest unavailable: {0}")]
    HashUnavailable(String),

    #[error("Failed to decode local key \"{key}\"")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Sync engine disposed")]
    Disposed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the next trigger can be expected to succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Store(_) | SyncError::Remote(RemoteError::Transport(_))
        )
    }
}

/// Convenience alias; the default error type is `SyncError`.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
