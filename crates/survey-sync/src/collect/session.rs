use crate::error::StoreError;
use crate::storage::keys::{SESSION_IDENTITY_KEYS, SURVEY_ID_KEY, SYNC_STATE_KEYS};
use crate::storage::{KeyValueStore, WriteGateway};
use crate::types::normalize_survey_id;

use super::sections::all_sections;

/// Every key removed when the active survey changes.
pub fn stale_session_keys() -> Vec<String> {
    let mut keys: Vec<String> = all_sections()
        .iter()
        .flat_map(|s| s.local_data_keys().into_iter().chain(s.local_complete_keys()))
        .collect();
    keys.extend(SESSION_IDENTITY_KEYS.iter().map(|k| k.to_string()));
    keys.extend(SYNC_STATE_KEYS.iter().map(|k| k.to_string()));
    keys
}

/// Drop the previous respondent's data if the stored survey id differs
/// from `new_survey_id`, then record the new id.
///
/// Ids are compared after normalization. Returns `true` when keys were
/// cleared. A store with no recorded id is not considered stale.
pub fn clear_stale_session(
    gateway: &WriteGateway,
    new_survey_id: &str,
) -> Result<bool, StoreError> {
    let new_id = normalize_survey_id(new_survey_id);
    let stored = gateway
        .get_item(SURVEY_ID_KEY)?
        .map(|s| normalize_survey_id(&s))
        .filter(|s| !s.is_empty());

    let stale = matches!(stored, Some(ref old) if *old != new_id);
    if stale {
        // Removing section keys is not a local edit.
        let _guard = gateway.begin_hydration();
        let keys = stale_session_keys();
        for key in &keys {
            gateway.remove_item(key)?;
        }
        gateway.clear_dirty();
        tracing::info!(
            previous = stored.as_deref().unwrap_or_default(),
            survey_id = %new_id,
            removed = keys.len(),
            "cleared stale survey session"
        );
    }

    if !new_id.is_empty() {
        gateway.set_item(SURVEY_ID_KEY, &new_id)?;
    }
    Ok(stale)
}
