//! Push notifications.
//!
//! Delivery is best-effort: a user without push credentials is skipped and
//! transport failures are logged, never propagated into state updates.

mod pushover;

pub use pushover::PushoverNotifier;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::store::{settings, StoreError, TrackingStore, WorkStatus};

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("Push service unreachable: {0}")]
    Transport(String),

    #[error("Push service rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// What a message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Update,
    StatusChange,
    GameAdded,
    GameRemoved,
    SyncComplete,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Update => "update",
            NotificationKind::StatusChange => "status_change",
            NotificationKind::GameAdded => "game_added",
            NotificationKind::GameRemoved => "game_removed",
            NotificationKind::SyncComplete => "sync_complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub url_title: Option<String>,
}

fn view_title(name: &str) -> String {
    format!("View {name} on F95Zone")
}

impl PushMessage {
    pub fn update(name: &str, version: &str, url: &str) -> Self {
        Self {
            kind: NotificationKind::Update,
            title: format!("Update: {name}"),
            body: format!("Version: {version}"),
            url: Some(url.to_string()),
            url_title: Some(view_title(name)),
        }
    }

    pub fn status_change(name: &str, status: WorkStatus, url: &str) -> Self {
        Self {
            kind: NotificationKind::StatusChange,
            title: format!("Status Change: {name}"),
            body: format!("New Status: {}", status.label()),
            url: Some(url.to_string()),
            url_title: Some(view_title(name)),
        }
    }

    pub fn game_added(name: &str, url: &str) -> Self {
        Self {
            kind: NotificationKind::GameAdded,
            title: format!("Game Added: {name}"),
            body: "Added to your monitored list.".to_string(),
            url: Some(url.to_string()),
            url_title: Some(view_title(name)),
        }
    }

    pub fn game_removed(name: &str, url: &str) -> Self {
        Self {
            kind: NotificationKind::GameRemoved,
            title: format!("Game Removed: {name}"),
            body: "Removed from list.".to_string(),
            url: Some(url.to_string()),
            url_title: None,
        }
    }

    pub fn manual_sync_complete(processed: usize, total: usize) -> Self {
        Self {
            kind: NotificationKind::SyncComplete,
            title: "Manual Sync Complete".to_string(),
            body: format!("Checked {processed}/{total} games for updates."),
            url: None,
            url_title: None,
        }
    }

    pub fn single_sync_complete() -> Self {
        Self {
            kind: NotificationKind::SyncComplete,
            title: "Game Sync Complete".to_string(),
            body: "Manual check for single game finished.".to_string(),
            url: None,
            url_title: None,
        }
    }
}

/// Per-user push service credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub user_key: String,
    pub api_token: String,
}

impl std::fmt::Debug for PushTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushTarget")
            .field("user_key", &self.user_key)
            .field("api_token", &"***")
            .finish()
    }
}

impl PushTarget {
    /// Both credentials from the user's settings, if set.
    pub fn for_user(store: &dyn TrackingStore, user_id: i64) -> Result<Option<Self>, StoreError> {
        let user_key = settings::get_non_empty(store, user_id, settings::PUSHOVER_USER_KEY)?;
        let api_token = settings::get_non_empty(store, user_id, settings::PUSHOVER_API_TOKEN)?;
        Ok(match (user_key, api_token) {
            (Some(user_key), Some(api_token)) => Some(Self { user_key, api_token }),
            _ => None,
        })
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), NotifyError>;
}

/// Result of a best-effort delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No push credentials
    Skipped,
    Failed,
}

/// Send `message` to `user_id`, logging instead of failing.
pub async fn notify_user(
    store: &dyn TrackingStore,
    notifier: &dyn Notifier,
    user_id: i64,
    message: &PushMessage,
) -> Delivery {
    let kind = message.kind.as_str();
    let target = match PushTarget::for_user(store, user_id) {
        Ok(Some(target)) => target,
        Ok(None) => {
            debug!(user_id, title = %message.title, "Push credentials missing, notification skipped");
            metrics::NOTIFICATIONS.with_label_values(&[kind, "skipped"]).inc();
            return Delivery::Skipped;
        }
        Err(e) => {
            warn!(user_id, error = %e, "Failed to read push credentials");
            metrics::NOTIFICATIONS.with_label_values(&[kind, "failed"]).inc();
            return Delivery::Failed;
        }
    };

    match notifier.send(&target, message).await {
        Ok(()) => {
            info!(user_id, title = %message.title, "Notification sent");
            metrics::NOTIFICATIONS.with_label_values(&[kind, "sent"]).inc();
            Delivery::Sent
        }
        Err(e) => {
            warn!(user_id, title = %message.title, error = %e, "Notification delivery failed");
            metrics::NOTIFICATIONS.with_label_values(&[kind, "failed"]).inc();
            Delivery::Failed
        }
    }
}
