//! Tracking store.
//!
//! Owns all persisted state: works, users, per-user tracking rows with their
//! observed, last-notified and acknowledged triples, and per-user settings.

pub mod settings;
mod sqlite;
mod types;

pub use sqlite::SqliteTrackingStore;
pub use types::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Work is already in this user's list")]
    AlreadyTracked,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Storage operations. Implementations serialise access internally.
pub trait TrackingStore: Send + Sync {
    // Users

    fn create_user(&self, username: &str, password_hash: &str, is_admin: bool) -> Result<User, StoreError>;

    /// Delete a user with their tracking rows and settings. Works stay.
    fn delete_user(&self, user_id: i64) -> Result<bool, StoreError>;

    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// First-created admin; owner of global settings.
    fn primary_admin(&self) -> Result<Option<User>, StoreError>;

    // Works

    /// Insert a work unless one with the same URL or thread ID exists.
    ///
    /// Returns the stored work and whether it was created. Known fields of an
    /// existing work are refreshed from `work`.
    fn upsert_work_by_url(&self, work: &NewWork, now: DateTime<Utc>) -> Result<(Work, bool), StoreError>;

    fn find_work_by_id(&self, id: i64) -> Result<Option<Work>, StoreError>;

    /// Exact URL match, falling back to the thread ID.
    fn find_work_by_url(&self, url: &str) -> Result<Option<Work>, StoreError>;

    /// Works whose name or author contains `term`.
    fn search_works(&self, term: &str, limit: u32) -> Result<Vec<Work>, StoreError>;

    /// Apply `update` atomically. Content changes bump `last_updated`.
    fn apply_work_update(&self, id: i64, update: &WorkUpdate, now: DateTime<Utc>) -> Result<Work, StoreError>;

    // Tracking rows

    /// Track a work, initialising all three triples to its current values.
    fn add_tracking(&self, user_id: i64, work_id: i64, now: DateTime<Utc>) -> Result<TrackingRow, StoreError>;

    fn get_tracking(&self, user_id: i64, tracking_id: i64) -> Result<Option<TrackingRow>, StoreError>;

    fn list_tracking(&self, user_id: i64, filter: &TrackingFilter) -> Result<Vec<TrackingRow>, StoreError>;

    /// Rows with notifications on whose work is neither completed nor abandoned.
    fn list_sync_candidates(&self, user_id: i64) -> Result<Vec<TrackingRow>, StoreError>;

    fn delete_tracking(&self, user_id: i64, tracking_id: i64) -> Result<bool, StoreError>;

    fn update_tracking(
        &self,
        user_id: i64,
        tracking_id: i64,
        update: &TrackingUpdate,
    ) -> Result<Option<TrackingRow>, StoreError>;

    /// Copy observed into acknowledged.
    fn acknowledge(&self, user_id: i64, tracking_id: i64) -> Result<Option<TrackingRow>, StoreError>;

    fn update_last_notified(&self, user_id: i64, tracking_id: i64, triple: &StateTriple) -> Result<(), StoreError>;

    // Settings

    fn get_setting(&self, user_id: i64, key: &str) -> Result<Option<String>, StoreError>;

    fn set_setting(&self, user_id: i64, key: &str, value: &str) -> Result<(), StoreError>;
}
