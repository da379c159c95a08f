use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::storage::KeyValueStore;
use crate::sync::clock::Clock;

/// Return this tab's identifier, generating and storing it on first use.
///
/// `session` is the per-tab store (`sessionStorage` in a browser), so the id
/// survives reloads of the same tab but differs between tabs. Randomness
/// comes from the OS source; if that fails a clock-seeded PRNG is used.
pub fn get_or_create_tab_id(session: &dyn KeyValueStore, key: &str, clock: &dyn Clock) -> String {
    if let Ok(Some(existing)) = session.get_item(key) {
        if !existing.is_empty() {
            return existing;
        }
    }

    let now = clock.now_ms();
    let id = format!("tab_{now}_{}", random_hex(now));
    if let Err(e) = session.set_item(key, &id) {
        tracing::warn!(error = %e, "could not persist tab id; it will not survive a reload");
    }
    id
}

fn random_hex(seed: i64) -> String {
    let mut buf = [0u8; 16];
    if let Err(e) = OsRng.try_fill_bytes(&mut buf) {
        tracing::warn!(error = %e, "OS randomness unavailable; using pseudo-random tab id");
        StdRng::seed_from_u64(seed as u64).fill_bytes(&mut buf);
    }
    hex::encode(buf)
}
