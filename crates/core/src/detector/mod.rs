//! Change detection for tracked works.
//!
//! A check matches the work against the lifecycle-filtered feeds, scrapes the
//! thread page when stored details are stale or incomplete, persists the
//! result as one update and notifies the user about changes they have not
//! been told about yet.

mod engine;
mod reconcile;

pub use engine::ChangeDetector;
pub use reconcile::{apply_feed_entry, apply_scrape, is_placeholder, scrape_reasons, ScrapeReason};

use serde::Serialize;
use thiserror::Error;

use crate::feed::StatusFilter;
use crate::notify::PushMessage;
use crate::store::{StoreError, Work, WorkStatus};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("tracking row {tracking_id} not found for user {user_id}")]
    NotTracked { user_id: i64, tracking_id: i64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub tracking_id: i64,
    /// Work after the update was applied
    pub work: Work,
    pub previous_status: WorkStatus,
    /// Feed the work was found in, if any
    pub matched_feed: Option<StatusFilter>,
    pub scraped: bool,
    /// Messages whose toggle was on
    pub notified: Vec<PushMessage>,
}
