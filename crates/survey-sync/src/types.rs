use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Outbound column set for one upsert: remote column name → value.
///
/// Only columns present in the patch are written; everything else on the
/// remote row is left untouched.
pub type RecordPatch = Map<String, Value>;

/// Fixed-length lowercase hex digest of a canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing hex digest (e.g. one read back from the local store).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cross-tab lock record stored as JSON under the lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(rename = "tabId")]
    pub tab_id: String,
    /// Epoch milliseconds of acquisition or last refresh. A record without a
    /// timestamp is treated as abandoned.
    #[serde(rename = "ts", alias = "timestamp", default)]
    pub timestamp: Option<i64>,
}

/// One remote row per respondent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub survey_id: String,
    /// Strictly monotonic write counter; `None` for rows written by paths
    /// that do not maintain it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Section JSON columns, completion flags, identity columns.
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

impl RemoteRecord {
    pub fn new(survey_id: impl Into<String>) -> Self {
        Self {
            survey_id: survey_id.into(),
            ..Default::default()
        }
    }

    /// Survey id of the row, falling back to the legacy `app_id` column.
    pub fn identity(&self) -> Option<&str> {
        Some(self.survey_id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.columns
                    .get("app_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
            })
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    /// True when the column holds a JSON object with at least one key.
    pub fn has_section_data(&self, column: &str) -> bool {
        matches!(self.columns.get(column), Some(Value::Object(m)) if !m.is_empty())
    }

    pub fn flag(&self, column: &str) -> bool {
        self.columns.get(column).and_then(Value::as_bool) == Some(true)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strip dashes and upper-case an application/survey identifier so that
/// `CAC-251022-81410SA` and `cac25102281410sa` address the same row.
pub fn normalize_survey_id(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}
