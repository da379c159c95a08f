//! WebAssembly bindings for `survey-sync`.
//!
//! The host hands in its `localStorage`, `sessionStorage` and a remote
//! client object; everything else (locking, fingerprinting, conflict
//! detection, hydration) runs in Rust.

mod conversions;
mod crypto;
mod engine;
mod error;
mod js_remote;
mod js_store;

use wasm_bindgen::prelude::*;

pub use crypto::SubtleCryptoHasher;
pub use engine::WasmSyncEngine;
pub use js_remote::{JsRemote, JsRemoteStore};
pub use js_store::{JsKeyValueStore, JsStorage};

/// Route `log` records (and `tracing` events, via its `log` feature) to the
/// browser console.
#[wasm_bindgen(start)]
pub fn init() {
    console_log::init_with_level(log::Level::Info).ok();
}
