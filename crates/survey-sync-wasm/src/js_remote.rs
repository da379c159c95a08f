//! `RemoteStore` over a JS client object.
//!
//! The host supplies:
//!
//! ```ts
//! interface RemoteClient {
//!   fetchRecord(surveyId: string): Promise<Record<string, unknown> | null>;
//!   upsertRecord(
//!     surveyId: string,
//!     patch: Record<string, unknown>,
//!     expectedVersion: number | null,
//!   ): Promise<{ status: "written"; version?: number }
//!            | { status: "conflict"; actualVersion?: number }>;
//! }
//! ```
//!
//! A rejected promise is a transport error.

use async_trait::async_trait;
use serde::Deserialize;
use survey_sync::error::RemoteError;
use survey_sync::sync::{RemoteStore, UpsertOutcome};
use survey_sync::types::{RecordPatch, RemoteRecord};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::conversions::{from_js_opt, to_js};
use crate::error::js_message;

#[wasm_bindgen]
extern "C" {
    pub type JsRemote;

    #[wasm_bindgen(method, catch, js_name = "fetchRecord")]
    fn fetch_record(this: &JsRemote, survey_id: &str) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "upsertRecord")]
    fn upsert_record(
        this: &JsRemote,
        survey_id: &str,
        patch: JsValue,
        expected_version: JsValue,
    ) -> Result<js_sys::Promise, JsValue>;
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum UpsertResponse {
    Written {
        #[serde(default)]
        version: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Conflict {
        #[serde(default)]
        actual_version: Option<i64>,
    },
}

pub struct JsRemoteStore {
    inner: JsRemote,
}

impl JsRemoteStore {
    pub fn new(remote: JsRemote) -> Self {
        Self { inner: remote }
    }
}

fn transport(e: JsValue) -> RemoteError {
    RemoteError::Transport(js_message(&e))
}

async fn settle(promise: Result<js_sys::Promise, JsValue>) -> Result<JsValue, RemoteError> {
    JsFuture::from(promise.map_err(transport)?)
        .await
        .map_err(transport)
}

#[async_trait(?Send)]
impl RemoteStore for JsRemoteStore {
    async fn fetch(&self, survey_id: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        let value = settle(self.inner.fetch_record(survey_id)).await?;
        let mut record: Option<RemoteRecord> = from_js_opt(value)
            .map_err(|e| RemoteError::Rejected(format!("malformed record: {}", js_message(&e))))?;
        if let Some(rec) = record.as_mut() {
            if rec.survey_id.is_empty() {
                rec.survey_id = survey_id.to_string();
            }
        }
        Ok(record)
    }

    async fn upsert(
        &self,
        survey_id: &str,
        patch: &RecordPatch,
        expected_version: Option<i64>,
    ) -> Result<UpsertOutcome, RemoteError> {
        let patch = to_js(patch).map_err(|e| RemoteError::Rejected(js_message(&e)))?;
        let expected = match expected_version {
            Some(v) => JsValue::from_f64(v as f64),
            None => JsValue::NULL,
        };
        let value = settle(self.inner.upsert_record(survey_id, patch, expected)).await?;
        let response: Option<UpsertResponse> = from_js_opt(value)
            .map_err(|e| RemoteError::Rejected(format!("malformed upsert response: {}", js_message(&e))))?;
        Ok(match response {
            Some(UpsertResponse::Conflict { actual_version }) => {
                UpsertOutcome::Conflict { actual_version }
            }
            Some(UpsertResponse::Written { version }) => UpsertOutcome::Written { version },
            None => UpsertOutcome::Written { version: None },
        })
    }
}
