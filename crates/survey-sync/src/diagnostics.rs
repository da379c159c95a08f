//! Opt-in smoke tests of the dirty tracker and engine, gated on query
//! parameters (`?debugSync=1`, `?debugSyncWrite=1`).
//!
//! Every key the battery touches is snapshotted first and restored after,
//! so running it leaves the local store as it found it.

use serde::Serialize;

use crate::storage::keys::DIRTY_KEY;
use crate::storage::KeyValueStore;
use crate::sync::engine::SyncEngine;
use crate::sync::types::{SyncOutcome, SyncTrigger};

/// Sync key written by the write checks.
pub const PROBE_SYNC_KEY: &str = "cross_dimensional_complete";
/// Non-sync key written by the write checks.
pub const PROBE_PLAIN_KEY: &str = "__syncdiag_test_key__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsMode {
    pub enabled: bool,
    /// Also run checks that write to the local store.
    pub write_checks: bool,
}

impl DiagnosticsMode {
    /// Parse a URL query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut mode = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value != "1" {
                continue;
            }
            match key.as_ref() {
                "debugSync" => mode.enabled = true,
                "debugSyncWrite" => {
                    mode.enabled = true;
                    mode.write_checks = true;
                }
                _ => {}
            }
        }
        mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticCheck {
    pub name: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub checks: Vec<DiagnosticCheck>,
}

impl DiagnosticsReport {
    fn record(&mut self, name: &'static str, passed: bool, detail: Option<String>) {
        if !passed {
            tracing::warn!(check = name, detail = ?detail, "sync diagnostic failed");
        }
        self.checks.push(DiagnosticCheck {
            name,
            passed,
            detail,
        });
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }
}

/// Run the battery. `None` when diagnostics are not enabled.
pub async fn run_diagnostics(engine: &SyncEngine, mode: DiagnosticsMode) -> Option<DiagnosticsReport> {
    if !mode.enabled {
        return None;
    }

    let raw = engine.gateway().inner();
    let snapshot: Vec<(&str, Option<String>)> = [DIRTY_KEY, PROBE_SYNC_KEY, PROBE_PLAIN_KEY]
        .into_iter()
        .map(|key| (key, raw.get_item(key).ok().flatten()))
        .collect();

    let mut report = DiagnosticsReport::default();

    engine.clear_dirty();
    report.record("clearDirty clears the flag", !engine.is_dirty(), None);

    engine.mark_dirty("diagnostics");
    report.record("markDirty sets the flag", engine.is_dirty(), None);

    engine.mark_dirty("diagnostics");
    report.record("markDirty is idempotent", engine.is_dirty(), None);

    engine.clear_dirty();
    report.record("clearDirty clears again", !engine.is_dirty(), None);

    let conflict = engine.has_conflict();
    report.record(
        "conflict flag is readable",
        true,
        Some(format!("hasConflict = {conflict}")),
    );

    if mode.write_checks {
        let written = engine.gateway().set_item(PROBE_SYNC_KEY, "true");
        report.record(
            "gateway write marks dirty",
            written.is_ok() && engine.is_dirty(),
            written.err().map(|e| e.to_string()),
        );

        engine.clear_dirty();
        let direct = raw.set_item(PROBE_PLAIN_KEY, "1");
        report.record(
            "direct store write succeeds",
            direct.is_ok(),
            direct.err().map(|e| e.to_string()),
        );
    }

    for (key, value) in &snapshot {
        let restored = match value {
            Some(v) => raw.set_item(key, v),
            None => raw.remove_item(key),
        };
        if let Err(e) = restored {
            tracing::warn!(key, error = %e, "could not restore key after diagnostics");
        }
    }
    if snapshot
        .iter()
        .any(|(key, value)| *key == DIRTY_KEY && value.is_some())
    {
        engine.mark_dirty("diagnostics:restore");
    } else {
        engine.clear_dirty();
    }

    let outcome = engine.sync(SyncTrigger::Force).await;
    report.record(
        "forced sync completes",
        !matches!(outcome, SyncOutcome::WriteFailed { .. }),
        Some(format!("{outcome:?}")),
    );

    tracing::info!(
        passed = report.passed(),
        total = report.total(),
        "sync diagnostics finished"
    );
    Some(report)
}
