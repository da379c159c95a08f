//! SHA-256 through WebCrypto (`crypto.subtle.digest`).

use async_trait::async_trait;
use survey_sync::canonical::ContentHasher;
use survey_sync::error::{Result, SyncError};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::js_message;

#[wasm_bindgen]
extern "C" {
    type SubtleCrypto;

    #[wasm_bindgen(method, catch)]
    fn digest(
        this: &SubtleCrypto,
        algorithm: &str,
        data: &js_sys::Uint8Array,
    ) -> std::result::Result<js_sys::Promise, JsValue>;
}

/// Hasher backed by the host's `crypto.subtle`. Never falls back to a
/// weaker digest; a host without WebCrypto gets `HashUnavailable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubtleCryptoHasher;

fn subtle() -> Result<SubtleCrypto> {
    let global = js_sys::global();
    let crypto = js_sys::Reflect::get(&global, &JsValue::from_str("crypto"))
        .map_err(|e| SyncError::HashUnavailable(js_message(&e)))?;
    if crypto.is_undefined() || crypto.is_null() {
        return Err(SyncError::HashUnavailable("crypto is undefined".to_string()));
    }
    let subtle = js_sys::Reflect::get(&crypto, &JsValue::from_str("subtle"))
        .map_err(|e| SyncError::HashUnavailable(js_message(&e)))?;
    if subtle.is_undefined() || subtle.is_null() {
        return Err(SyncError::HashUnavailable(
            "crypto.subtle is undefined".to_string(),
        ));
    }
    Ok(subtle.unchecked_into())
}

#[async_trait(?Send)]
impl ContentHasher for SubtleCryptoHasher {
    async fn digest(&self, text: &str) -> Result<String> {
        let subtle = subtle()?;
        let data = js_sys::Uint8Array::from(text.as_bytes());
        let promise = subtle
            .digest("SHA-256", &data)
            .map_err(|e| SyncError::HashUnavailable(js_message(&e)))?;
        let buffer = JsFuture::from(promise)
            .await
            .map_err(|e| SyncError::HashUnavailable(js_message(&e)))?;
        let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
        Ok(hex::encode(bytes))
    }
}
