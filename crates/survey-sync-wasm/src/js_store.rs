//! `KeyValueStore` over a Web `Storage` object (`localStorage`,
//! `sessionStorage`, or anything with the same shape).

use survey_sync::error::StoreError;
use survey_sync::storage::KeyValueStore;
use wasm_bindgen::prelude::*;

use crate::error::{js_error_name, js_message};

#[wasm_bindgen]
extern "C" {
    /// Object with the Web Storage API.
    pub type JsStorage;

    #[wasm_bindgen(method, catch, js_name = "getItem")]
    fn get_item(this: &JsStorage, key: &str) -> Result<Option<String>, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "setItem")]
    fn set_item(this: &JsStorage, key: &str, value: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = "removeItem")]
    fn remove_item(this: &JsStorage, key: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn key(this: &JsStorage, index: u32) -> Result<Option<String>, JsValue>;

    #[wasm_bindgen(method, getter)]
    fn length(this: &JsStorage) -> u32;
}

pub struct JsKeyValueStore {
    inner: JsStorage,
}

// SAFETY: wasm32 without threads has a single thread; the JS handle never
// crosses one.
unsafe impl Send for JsKeyValueStore {}
unsafe impl Sync for JsKeyValueStore {}

impl JsKeyValueStore {
    pub fn new(storage: JsStorage) -> Self {
        Self { inner: storage }
    }
}

fn store_err(e: JsValue) -> StoreError {
    StoreError::Unavailable(js_message(&e))
}

impl KeyValueStore for JsKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_item(key).map_err(store_err)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_item(key, value).map_err(|e| {
            if js_error_name(&e).as_deref() == Some("QuotaExceededError") {
                StoreError::QuotaExceeded {
                    key: key.to_string(),
                }
            } else {
                store_err(e)
            }
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove_item(key).map_err(store_err)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let len = self.inner.length();
        let mut keys = Vec::with_capacity(len as usize);
        for i in 0..len {
            if let Some(k) = self.inner.key(i).map_err(store_err)? {
                keys.push(k);
            }
        }
        Ok(keys)
    }
}
