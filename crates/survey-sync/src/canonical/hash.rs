//! Content hashing over canonical strings.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::Fingerprint;

use super::serialize::{stable_stringify, CanonicalOptions};

/// Length of a SHA-256 digest rendered as hex.
pub const DIGEST_HEX_LEN: usize = 64;

/// Produces a fixed-length lowercase hex digest of a string.
///
/// Async so that host primitives (e.g. WebCrypto) fit behind it. An
/// implementation whose primitive is missing must return
/// [`SyncError::HashUnavailable`](crate::error::SyncError::HashUnavailable)
/// rather than degrade to a weaker hash.
#[async_trait(?Send)]
pub trait ContentHasher {
    async fn digest(&self, text: &str) -> Result<String>;
}

/// SHA-256 computed in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

#[async_trait(?Send)]
impl ContentHasher for Sha256Hasher {
    async fn digest(&self, text: &str) -> Result<String> {
        Ok(hex::encode(Sha256::digest(text.as_bytes())))
    }
}

/// Fingerprint of a JSON value: digest of its null-free canonical string.
pub async fn fingerprint(hasher: &dyn ContentHasher, value: &Value) -> Result<Fingerprint> {
    let stable = stable_stringify(value, CanonicalOptions::DROP_NULL);
    hasher.digest(&stable).await.map(Fingerprint::from_hex)
}

/// Whether `s` looks like a digest this module produces.
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
