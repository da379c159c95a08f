//! Canonical serialization and content fingerprints.
//!
//! Two semantically equal values (same keys and leaves, any insertion order)
//! always serialize to the same string, and therefore hash to the same
//! [`Fingerprint`](crate::types::Fingerprint).

pub mod hash;
pub mod serialize;

pub use hash::{fingerprint, is_digest, ContentHasher, Sha256Hasher, DIGEST_HEX_LEN};
pub use serialize::{canonicalize, canonicalize_serializable, stable_stringify, CanonicalOptions};
