//! Error conversion across the wasm-bindgen boundary.

use survey_sync::error::{StoreError, SyncError};
use wasm_bindgen::{JsCast, JsValue};

/// Build a JS `Error` carrying the display message of a Rust error.
pub fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

pub trait IntoJsResult<T> {
    fn into_js(self) -> Result<T, JsValue>;
}

impl<T> IntoJsResult<T> for Result<T, SyncError> {
    fn into_js(self) -> Result<T, JsValue> {
        self.map_err(to_js_error)
    }
}

impl<T> IntoJsResult<T> for Result<T, StoreError> {
    fn into_js(self) -> Result<T, JsValue> {
        self.map_err(to_js_error)
    }
}

/// Best-effort message from a thrown JS value.
pub fn js_message(e: &JsValue) -> String {
    if let Some(s) = e.as_string() {
        s
    } else if let Some(err) = e.dyn_ref::<js_sys::Error>() {
        err.message().into()
    } else {
        format!("{e:?}")
    }
}

/// `name` of a thrown `Error` (`"QuotaExceededError"`, `"SecurityError"`).
pub fn js_error_name(e: &JsValue) -> Option<String> {
    e.dyn_ref::<js_sys::Error>().map(|err| err.name().into())
}
