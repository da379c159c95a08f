//! `WasmSyncEngine`, the JS-facing handle.

use std::rc::Rc;
use std::sync::Arc;

use survey_sync::diagnostics::{run_diagnostics, DiagnosticsMode};
use survey_sync::storage::KeyValueStore;
use survey_sync::sync::{SyncConfig, SyncEngine, SyncEngineOptions, SyncTrigger};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::conversions::{from_js, from_js_opt, to_js};
use crate::crypto::SubtleCryptoHasher;
use crate::error::IntoJsResult;
use crate::js_remote::{JsRemote, JsRemoteStore};
use crate::js_store::{JsKeyValueStore, JsStorage};

/// JS listener stored inside the engine's emitter.
struct SendSyncCallback(js_sys::Function);

// SAFETY: wasm32 without threads has a single thread; the function is only
// ever called on it.
unsafe impl Send for SendSyncCallback {}
unsafe impl Sync for SendSyncCallback {}

#[wasm_bindgen]
pub struct WasmSyncEngine {
    engine: Rc<SyncEngine>,
}

#[wasm_bindgen]
impl WasmSyncEngine {
    /// `config` is an optional object such as `{ lockTtlMs: 30000 }`;
    /// omitted fields take their defaults. `surveyId` pins the survey
    /// instead of reading it from `local`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        local: JsStorage,
        session: JsStorage,
        remote: JsRemote,
        config: JsValue,
        survey_id: Option<String>,
    ) -> Result<WasmSyncEngine, JsValue> {
        let config: Option<SyncConfig> = from_js_opt(config)?;
        let store: Arc<dyn KeyValueStore> = Arc::new(JsKeyValueStore::new(local));
        let session: Arc<dyn KeyValueStore> = Arc::new(JsKeyValueStore::new(session));

        let mut options = SyncEngineOptions::new(store, session, Arc::new(JsRemoteStore::new(remote)));
        options.hasher = Some(Arc::new(SubtleCryptoHasher));
        options.config = config;
        options.survey_id = survey_id;

        Ok(Self {
            engine: Rc::new(SyncEngine::new(options)),
        })
    }

    // -----------------------------------------------------------------------
    // Local store, through the write gateway
    // -----------------------------------------------------------------------

    #[wasm_bindgen(js_name = "getItem")]
    pub fn get_item(&self, key: &str) -> Result<Option<String>, JsValue> {
        self.engine.gateway().get_item(key).into_js()
    }

    #[wasm_bindgen(js_name = "setItem")]
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), JsValue> {
        self.engine.gateway().set_item(key, value).into_js()
    }

    #[wasm_bindgen(js_name = "removeItem")]
    pub fn remove_item(&self, key: &str) -> Result<(), JsValue> {
        self.engine.gateway().remove_item(key).into_js()
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    #[wasm_bindgen(js_name = "markDirty")]
    pub fn mark_dirty(&self, reason: Option<String>) {
        self.engine.mark_dirty(reason.as_deref().unwrap_or("host"));
    }

    #[wasm_bindgen(js_name = "clearDirty")]
    pub fn clear_dirty(&self) {
        self.engine.clear_dirty();
    }

    #[wasm_bindgen(js_name = "isDirty")]
    pub fn is_dirty(&self) -> bool {
        self.engine.is_dirty()
    }

    #[wasm_bindgen(js_name = "hasConflict")]
    pub fn has_conflict(&self) -> bool {
        self.engine.has_conflict()
    }

    #[wasm_bindgen(getter, js_name = "tabId")]
    pub fn tab_id(&self) -> String {
        self.engine.tab_id().to_string()
    }

    #[wasm_bindgen(getter, js_name = "surveyId")]
    pub fn survey_id(&self) -> Option<String> {
        self.engine.survey_id()
    }

    /// Period the host should call [`tick`](Self::tick) at.
    #[wasm_bindgen(getter, js_name = "syncIntervalMs")]
    pub fn sync_interval_ms(&self) -> f64 {
        self.engine.config().sync_interval_ms as f64
    }

    // -----------------------------------------------------------------------
    // Triggers (each returns a Promise)
    // -----------------------------------------------------------------------

    /// Resolves to `true` when local and remote agree afterwards.
    #[wasm_bindgen(js_name = "forceSyncNow")]
    pub fn force_sync_now(&self) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move { Ok(JsValue::from_bool(engine.force_sync_now().await)) })
    }

    /// Resolves to the outcome object, e.g. `{ status: "synced", version: 4 }`.
    pub fn sync(&self, trigger: JsValue) -> Result<js_sys::Promise, JsValue> {
        let trigger: SyncTrigger = from_js(trigger)?;
        let engine = Rc::clone(&self.engine);
        Ok(future_to_promise(async move {
            to_js(&engine.sync(trigger).await)
        }))
    }

    pub fn tick(&self) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move { to_js(&engine.on_interval().await) })
    }

    /// Resolves to `null` on the first path and when the path did not change.
    #[wasm_bindgen(js_name = "routeChanged")]
    pub fn route_changed(&self, path: String) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move {
            match engine.on_route_change(&path).await {
                Some(outcome) => to_js(&outcome),
                None => Ok(JsValue::NULL),
            }
        })
    }

    pub fn unload(&self) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move { to_js(&engine.on_unload().await) })
    }

    pub fn hydrate(&self) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move { to_js(&engine.hydrate_from_remote().await) })
    }

    #[wasm_bindgen(js_name = "resolveConflict")]
    pub fn resolve_conflict(&self) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move { to_js(&engine.resolve_conflict_from_server().await) })
    }

    // -----------------------------------------------------------------------
    // Session, diagnostics, events
    // -----------------------------------------------------------------------

    #[wasm_bindgen(js_name = "clearStaleSession")]
    pub fn clear_stale_session(&self, survey_id: &str) -> bool {
        self.engine.clear_stale_session(survey_id)
    }

    /// Run the diagnostics battery selected by a URL query string
    /// (`?debugSync=1`, `?debugSyncWrite=1`). Resolves to `null` when
    /// neither flag is present.
    #[wasm_bindgen(js_name = "runDiagnostics")]
    pub fn run_diagnostics(&self, query: String) -> js_sys::Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move {
            match run_diagnostics(&engine, DiagnosticsMode::from_query(&query)).await {
                Some(report) => to_js(&report),
                None => Ok(JsValue::NULL),
            }
        })
    }

    /// Register a listener for sync events. Returns an unsubscribe function.
    #[wasm_bindgen(js_name = "onEvent")]
    pub fn on_event(&self, callback: js_sys::Function) -> JsValue {
        let cb = Arc::new(SendSyncCallback(callback));
        let id = self.engine.subscribe(move |event| match to_js(event) {
            Ok(value) => {
                if let Err(e) = cb.0.call1(&JsValue::NULL, &value) {
                    tracing::warn!(error = ?e, "sync event listener threw");
                }
            }
            Err(e) => tracing::warn!(error = ?e, "could not convert sync event"),
        });

        let engine = Rc::clone(&self.engine);
        Closure::once_into_js(move || engine.unsubscribe(id))
    }

    pub fn dispose(&self) {
        self.engine.dispose();
    }
}
