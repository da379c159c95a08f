//! Inverse of the collector: copies a remote record into local keys.

use serde_json::Value;

use crate::error::StoreError;
use crate::storage::keys::{
    AUTH_COMPLETED_KEY, AUTH_EMAIL_KEY, COMPANY_NAME_KEY, COMPLETION_SHOWN_KEY,
    EMPLOYEE_OPT_IN_KEY, LEGACY_SURVEY_ID_KEY, LOGIN_COMPANY_NAME_KEY, LOGIN_EMAIL_KEY,
    LOGIN_FIRST_NAME_KEY, LOGIN_LAST_NAME_KEY, LOGIN_TITLE_KEY, SURVEY_ID_KEY,
    SURVEY_SUBMITTED_KEY, VERSION_KEY,
};
use crate::storage::{KeyValueStore, WriteGateway};
use crate::types::RemoteRecord;

use super::collector::{
    AUTH_COMPLETED_COLUMN, COMPANY_NAME_COLUMN, EMAIL_COLUMN, EMPLOYEE_OPT_IN_COLUMN,
    SURVEY_SUBMITTED_COLUMN,
};
use super::sections::{all_sections, Section, FIRMOGRAPHICS};

/// Firmographics fields copied back into the login keys.
const FIRMOGRAPHICS_LOGIN_KEYS: &[(&str, &str)] = &[
    ("firstName", LOGIN_FIRST_NAME_KEY),
    ("lastName", LOGIN_LAST_NAME_KEY),
    ("title", LOGIN_TITLE_KEY),
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HydrationReport {
    /// Sections whose data key was written.
    pub sections: Vec<String>,
    pub version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Hydrator {
    sections: Vec<Section>,
}

impl Default for Hydrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Hydrator {
    pub fn new() -> Self {
        Self {
            sections: all_sections(),
        }
    }

    /// Write `record` into the local store.
    ///
    /// Runs under a hydration guard, so none of these writes mark the
    /// store dirty. Completion flags mirror the remote booleans exactly.
    pub fn hydrate(
        &self,
        gateway: &WriteGateway,
        record: &RemoteRecord,
    ) -> Result<HydrationReport, StoreError> {
        let _guard = gateway.begin_hydration();
        let mut report = HydrationReport {
            version: record.version,
            ..Default::default()
        };

        for section in &self.sections {
            let column = section.data_column();
            if record.has_section_data(&column) {
                if let Some(value) = record.column(&column) {
                    gateway.set_item(&section.local_data_key(), &value.to_string())?;
                    report.sections.push(section.remote_stem.clone());
                }
            }
            let complete_key = section.local_complete_key();
            if record.flag(&section.complete_column()) {
                gateway.set_item(&complete_key, "true")?;
            } else {
                gateway.remove_item(&complete_key)?;
            }
        }

        if record.flag(AUTH_COMPLETED_COLUMN) {
            gateway.set_item(AUTH_COMPLETED_KEY, "true")?;
        }

        if record.flag(SURVEY_SUBMITTED_COLUMN) {
            gateway.set_item(SURVEY_SUBMITTED_KEY, "true")?;
            gateway.set_item(COMPLETION_SHOWN_KEY, "true")?;
        }
        if let Some(Value::Bool(opt_in)) = record.column(EMPLOYEE_OPT_IN_COLUMN) {
            gateway.set_item(EMPLOYEE_OPT_IN_KEY, &opt_in.to_string())?;
        }

        let company = non_empty_str(record.column(COMPANY_NAME_COLUMN));
        if let Some(company) = company {
            gateway.set_item(LOGIN_COMPANY_NAME_KEY, company)?;
            gateway.set_item(COMPANY_NAME_KEY, company)?;
        }
        if let Some(email) = non_empty_str(record.column(EMAIL_COLUMN)) {
            gateway.set_item(AUTH_EMAIL_KEY, email)?;
            gateway.set_item(LOGIN_EMAIL_KEY, email)?;
        }
        if let Some(id) = record.identity() {
            gateway.set_item(SURVEY_ID_KEY, id)?;
            gateway.set_item(LEGACY_SURVEY_ID_KEY, id)?;
        }

        if let Some(firmo) = record.column(&format!("{FIRMOGRAPHICS}_data")) {
            for (field, key) in FIRMOGRAPHICS_LOGIN_KEYS {
                if let Some(value) = non_empty_str(firmo.get(*field)) {
                    gateway.set_item(key, value)?;
                }
            }
            if company.is_none() {
                if let Some(name) = non_empty_str(firmo.get("companyName")) {
                    gateway.set_item(LOGIN_COMPANY_NAME_KEY, name)?;
                }
            }
        }

        if let Some(version) = record.version {
            gateway.set_item(VERSION_KEY, &version.to_string())?;
        }

        tracing::info!(
            survey_id = record.identity().unwrap_or_default(),
            sections = report.sections.len(),
            version = ?record.version,
            "hydrated local store from remote record"
        );
        Ok(report)
    }

    /// Remove every local section data and completion key, without marking
    /// the store dirty.
    pub fn clear_sections(&self, gateway: &WriteGateway) -> Result<(), StoreError> {
        let _guard = gateway.begin_hydration();
        for section in &self.sections {
            for key in section
                .local_data_keys()
                .into_iter()
                .chain(section.local_complete_keys())
            {
                gateway.remove_item(&key)?;
            }
        }
        Ok(())
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Whether any section data key holds something other than an empty
/// object. Hydration must not overwrite answers that exist only locally.
pub fn local_has_section_data(store: &dyn KeyValueStore) -> Result<bool, StoreError> {
    for section in all_sections() {
        for key in section.local_data_keys() {
            if let Some(raw) = store.get_item(&key)? {
                let empty = matches!(
                    serde_json::from_str::<Value>(&raw),
                    Ok(Value::Object(ref m)) if m.is_empty()
                );
                if !raw.trim().is_empty() && !empty {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}
