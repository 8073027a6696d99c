//! Setting keys and typed accessors.
//!
//! Values are opaque strings; booleans are stored as `True`/`False`.

use crate::thread_page::Credentials;

use super::{StoreError, TrackingStore};

// Per-user keys
pub const PUSHOVER_USER_KEY: &str = "pushover_user_key";
pub const PUSHOVER_API_TOKEN: &str = "pushover_api_token";
pub const NOTIFY_ON_GAME_ADD: &str = "notify_on_game_add";
pub const NOTIFY_ON_GAME_DELETE: &str = "notify_on_game_delete";
pub const NOTIFY_ON_GAME_UPDATE: &str = "notify_on_game_update";
pub const NOTIFY_ON_STATUS_CHANGE_COMPLETED: &str = "notify_on_status_change_completed";
pub const NOTIFY_ON_STATUS_CHANGE_ABANDONED: &str = "notify_on_status_change_abandoned";
pub const NOTIFY_ON_STATUS_CHANGE_ON_HOLD: &str = "notify_on_status_change_on_hold";
pub const NOTIFY_ON_SYNC_COMPLETE: &str = "notify_on_sync_complete";
pub const FORCE_SCRAPE_ON_MANUAL_SYNC: &str = "force_scrape_on_manual_sync";

// Primary-admin keys
pub const FORUM_USERNAME: &str = "f95_username";
pub const FORUM_PASSWORD: &str = "f95_password";
pub const UPDATE_SCHEDULE_HOURS: &str = "update_schedule_hours_global";
pub const LAST_SCHEDULED_SYNC_AT: &str = "last_user_specific_sync_completed_at";

pub fn bool_to_setting(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Read a boolean setting, falling back to `default` when unset.
pub fn get_flag(
    store: &dyn TrackingStore,
    user_id: i64,
    key: &str,
    default: bool,
) -> Result<bool, StoreError> {
    Ok(store
        .get_setting(user_id, key)?
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default))
}

pub fn set_flag(
    store: &dyn TrackingStore,
    user_id: i64,
    key: &str,
    value: bool,
) -> Result<(), StoreError> {
    store.set_setting(user_id, key, bool_to_setting(value))
}

/// Non-empty trimmed setting value.
pub fn get_non_empty(
    store: &dyn TrackingStore,
    user_id: i64,
    key: &str,
) -> Result<Option<String>, StoreError> {
    Ok(store
        .get_setting(user_id, key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Forum login stored under the primary admin, if both halves are set.
pub fn forum_credentials(store: &dyn TrackingStore) -> Result<Option<Credentials>, StoreError> {
    let Some(admin) = store.primary_admin()? else {
        return Ok(None);
    };
    let username = get_non_empty(store, admin.id, FORUM_USERNAME)?;
    let password = get_non_empty(store, admin.id, FORUM_PASSWORD)?;
    Ok(match (username, password) {
        (Some(username), Some(password)) => Some(Credentials::new(username, password)),
        _ => None,
    })
}
