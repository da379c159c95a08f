//! Builds the outbound record patch from the flat local keys.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{StoreError, SyncError};
use crate::storage::keys::{
    AUTH_COMPLETED_KEY, AUTH_EMAIL_KEY, COMPANY_NAME_KEY, EMPLOYEE_OPT_IN_KEY,
    LOGIN_COMPANY_NAME_KEY, LOGIN_EMAIL_KEY, LOGIN_FIRST_NAME_KEY, LOGIN_LAST_NAME_KEY,
    LOGIN_TITLE_KEY, SURVEY_SUBMITTED_KEY,
};
use crate::storage::KeyValueStore;
use crate::types::RecordPatch;

use super::sections::{all_sections, Section, FIRMOGRAPHICS};

pub const COMPANY_NAME_COLUMN: &str = "company_name";
pub const EMAIL_COLUMN: &str = "email";
pub const AUTH_COMPLETED_COLUMN: &str = "auth_completed";
pub const SURVEY_SUBMITTED_COLUMN: &str = "survey_submitted";
pub const EMPLOYEE_OPT_IN_COLUMN: &str = "employee_survey_opt_in";

/// Local identity keys folded into the firmographics payload, with the
/// field name each one becomes.
const FIRMOGRAPHICS_IDENTITY_FIELDS: &[(&str, &str)] = &[
    (LOGIN_FIRST_NAME_KEY, "firstName"),
    (LOGIN_LAST_NAME_KEY, "lastName"),
    (LOGIN_TITLE_KEY, "title"),
];

/// A local key that could not be used.
#[derive(Debug)]
pub struct SkippedKey {
    pub key: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct CollectedPayload {
    pub patch: RecordPatch,
    pub skipped: Vec<SkippedKey>,
}

impl CollectedPayload {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// Whether any section data column is present.
    pub fn has_section_data(&self) -> bool {
        all_sections()
            .iter()
            .any(|s| self.patch.contains_key(&s.data_column()))
    }
}

/// Reads every known section out of a local store.
#[derive(Debug, Clone)]
pub struct SectionCollector {
    sections: Vec<Section>,
}

impl Default for SectionCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionCollector {
    pub fn new() -> Self {
        Self {
            sections: all_sections(),
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Assemble the outbound patch.
    ///
    /// A section with a non-empty object payload contributes its data column
    /// and `<column>_complete = true`; an explicit `"true"` completion flag
    /// contributes the flag alone. Malformed entries are recorded in
    /// `skipped` and never abort collection. Only a store that cannot be
    /// read at all is an error.
    pub fn collect(&self, store: &dyn KeyValueStore) -> Result<CollectedPayload, StoreError> {
        let present: HashSet<String> = store.keys()?.into_iter().collect();
        let read = |key: &str| -> Result<Option<String>, StoreError> {
            if present.contains(key) {
                store.get_item(key)
            } else {
                Ok(None)
            }
        };

        let mut out = CollectedPayload::default();

        for section in &self.sections {
            if let Some(obj) = self.read_section(section, &read, &mut out.skipped)? {
                out.patch.insert(section.data_column(), Value::Object(obj));
                out.patch.insert(section.complete_column(), Value::Bool(true));
                continue;
            }
            for key in section.local_complete_keys() {
                if read(&key)?.as_deref() == Some("true") {
                    out.patch.insert(section.complete_column(), Value::Bool(true));
                    break;
                }
            }
        }

        if read(AUTH_COMPLETED_KEY)?.as_deref() == Some("true") {
            out.patch
                .insert(AUTH_COMPLETED_COLUMN.to_string(), Value::Bool(true));
        }

        if read(SURVEY_SUBMITTED_KEY)?.as_deref() == Some("true") {
            out.patch
                .insert(SURVEY_SUBMITTED_COLUMN.to_string(), Value::Bool(true));
        }
        if let Some(opt_in) = read(EMPLOYEE_OPT_IN_KEY)?.filter(|v| !v.is_empty()) {
            out.patch.insert(
                EMPLOYEE_OPT_IN_COLUMN.to_string(),
                Value::Bool(opt_in == "true"),
            );
        }

        self.fold_identity(&read, &mut out.patch)?;

        tracing::debug!(
            columns = out.patch.len(),
            skipped = out.skipped.len(),
            "collected local payload"
        );
        Ok(out)
    }

    fn read_section(
        &self,
        section: &Section,
        read: &dyn Fn(&str) -> Result<Option<String>, StoreError>,
        skipped: &mut Vec<SkippedKey>,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        for key in section.local_data_keys() {
            let Some(raw) = read(&key)? else { continue };
            if raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(obj)) if !obj.is_empty() => return Ok(Some(obj)),
                Ok(Value::Object(_)) => {}
                Ok(other) => {
                    tracing::warn!(key = %key, kind = json_kind(&other), "section payload is not an object; skipping");
                    skipped.push(SkippedKey {
                        key: key.clone(),
                        error: SyncError::Internal(format!(
                            "expected a JSON object, found {}",
                            json_kind(&other)
                        )),
                    });
                }
                Err(source) => {
                    tracing::warn!(key = %key, error = %source, "malformed section JSON; skipping");
                    skipped.push(SkippedKey {
                        key: key.clone(),
                        error: SyncError::Decode { key, source },
                    });
                }
            }
        }
        Ok(None)
    }

    fn fold_identity(
        &self,
        read: &dyn Fn(&str) -> Result<Option<String>, StoreError>,
        patch: &mut RecordPatch,
    ) -> Result<(), StoreError> {
        let firmographics_column = format!("{FIRMOGRAPHICS}_data");

        let from_firmographics = patch
            .get(&firmographics_column)
            .and_then(|v| v.get("companyName"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let company = match from_firmographics {
            Some(name) => Some(name),
            None => first_non_empty(read, &[LOGIN_COMPANY_NAME_KEY, COMPANY_NAME_KEY])?,
        };
        if let Some(company) = company {
            patch.insert(COMPANY_NAME_COLUMN.to_string(), Value::String(company));
        }

        if let Some(email) = first_non_empty(read, &[AUTH_EMAIL_KEY, LOGIN_EMAIL_KEY])? {
            patch.insert(
                EMAIL_COLUMN.to_string(),
                Value::String(email.to_lowercase()),
            );
        }

        // Only enrich a firmographics payload that already exists; creating
        // one here would mark the section complete.
        if let Some(Value::Object(firmo)) = patch.get_mut(&firmographics_column) {
            for (key, field) in FIRMOGRAPHICS_IDENTITY_FIELDS {
                if firmo.contains_key(*field) {
                    continue;
                }
                if let Some(value) = first_non_empty(read, &[*key])? {
                    firmo.insert(field.to_string(), Value::String(value));
                }
            }
        }
        Ok(())
    }
}

fn first_non_empty(
    read: &dyn Fn(&str) -> Result<Option<String>, StoreError>,
    keys: &[&str],
) -> Result<Option<String>, StoreError> {
    for key in keys {
        if let Some(value) = read(key)? {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
    Ok(None)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
