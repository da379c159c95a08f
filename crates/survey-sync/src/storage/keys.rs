//! Local-store key naming conventions.

use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Sync-state keys (local store)
// ============================================================================

/// Persisted dirty flag (`"true"` when set).
pub const DIRTY_KEY: &str = "dirty";

/// Revision bumped by every observed edit of a sync key, from any tab.
pub const DIRTY_REV_KEY: &str = "dirty_rev";

/// Fingerprint of the last payload confirmed written to the remote row.
pub const LAST_FINGERPRINT_KEY: &str = "sync_last_fingerprint";

/// Last remote `version` this client observed (hydration or own write).
pub const VERSION_KEY: &str = "assessment_version";

/// Prefix of the cross-tab lock key; the survey id is appended.
pub const LOCK_KEY_PREFIX: &str = "sync_lock_";

// ============================================================================
// Session-store keys (per tab)
// ============================================================================

pub const TAB_ID_KEY: &str = "sync_tab_id";

/// Session-scoped conflict flag.
pub const CONFLICT_KEY: &str = "version_conflict";

// ============================================================================
// Identity keys
// ============================================================================

pub const SURVEY_ID_KEY: &str = "survey_id";
pub const LEGACY_SURVEY_ID_KEY: &str = "login_Survey_id";

pub const LOGIN_EMAIL_KEY: &str = "login_email";
pub const AUTH_EMAIL_KEY: &str = "auth_email";
pub const LOGIN_COMPANY_NAME_KEY: &str = "login_company_name";
pub const COMPANY_NAME_KEY: &str = "company_name";
pub const LOGIN_FIRST_NAME_KEY: &str = "login_first_name";
pub const LOGIN_LAST_NAME_KEY: &str = "login_last_name";
pub const LOGIN_TITLE_KEY: &str = "login_title";
pub const AUTH_COMPLETED_KEY: &str = "auth_completed";

// ============================================================================
// Survey-state keys
// ============================================================================

/// `"true"` once the respondent submitted the whole survey.
pub const SURVEY_SUBMITTED_KEY: &str = "survey_fully_submitted";
pub const COMPLETION_SHOWN_KEY: &str = "assessment_completion_shown";
/// `"true"`/`"false"`; absent until the respondent answered.
pub const EMPLOYEE_OPT_IN_KEY: &str = "employee_survey_opt_in";

/// Identity keys whose values are folded into the outbound payload.
pub const IDENTITY_KEYS: &[&str] = &[
    LOGIN_EMAIL_KEY,
    AUTH_EMAIL_KEY,
    LOGIN_COMPANY_NAME_KEY,
    COMPANY_NAME_KEY,
    LOGIN_FIRST_NAME_KEY,
    LOGIN_LAST_NAME_KEY,
    LOGIN_TITLE_KEY,
];

/// Identity and auth keys removed when the active survey changes.
pub const SESSION_IDENTITY_KEYS: &[&str] = &[
    LEGACY_SURVEY_ID_KEY,
    LOGIN_EMAIL_KEY,
    AUTH_EMAIL_KEY,
    LOGIN_COMPANY_NAME_KEY,
    COMPANY_NAME_KEY,
    LOGIN_FIRST_NAME_KEY,
    LOGIN_LAST_NAME_KEY,
    LOGIN_TITLE_KEY,
    AUTH_COMPLETED_KEY,
    "auth_completed_at",
    "user_authenticated",
    "payment_completed",
    "payment_method",
    "payment_date",
    SURVEY_SUBMITTED_KEY,
    COMPLETION_SHOWN_KEY,
    EMPLOYEE_OPT_IN_KEY,
];

/// Sync bookkeeping removed when the active survey changes.
pub const SYNC_STATE_KEYS: &[&str] = &[DIRTY_KEY, DIRTY_REV_KEY, LAST_FINGERPRINT_KEY, VERSION_KEY];

// ============================================================================
// Key helpers
// ============================================================================

pub fn data_key(stem: &str) -> String {
    format!("{stem}_data")
}

pub fn complete_key(stem: &str) -> String {
    format!("{stem}_complete")
}

pub fn lock_key(survey_id: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{survey_id}")
}

fn section_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(firmographics|general_benefits|current_support|cross_dimensional|employee-impact-assessment|employee_impact|dimension(?:1[0-3]|[1-9]))_(?:data|complete)$",
        )
        .expect("section key pattern is a valid regex")
    })
}

/// Whether a write to `key` changes what the collector would send.
pub fn is_sync_key(key: &str) -> bool {
    section_key_pattern().is_match(key)
        || key == AUTH_COMPLETED_KEY
        || key == SURVEY_SUBMITTED_KEY
        || key == EMPLOYEE_OPT_IN_KEY
        || IDENTITY_KEYS.contains(&key)
}
