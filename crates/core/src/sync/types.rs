use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::detector::DetectError;
use crate::feed::FeedEntry;
use crate::store::{PendingReason, StoreError, TrackingRow, Work, WorkStatus};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feed unavailable: {0}")]
    Feed(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// Outcome of a per-user or global sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

impl SyncReport {
    pub fn absorb(&mut self, other: &SyncReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.total += other.total;
    }
}

/// What a scheduler tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduledRun {
    Disabled,
    Skipped { next_due: DateTime<Utc> },
    Completed { report: SyncReport, next_due: DateTime<Utc> },
    /// Shutdown cut the run short; the completion time is not recorded.
    Interrupted { report: SyncReport },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub seen: usize,
    pub created: usize,
    pub scraped: usize,
}

/// A tracking row the user has not acknowledged yet.
#[derive(Debug, Clone, Serialize)]
pub struct PendingUpdate {
    #[serde(flatten)]
    pub row: TrackingRow,
    pub reasons: Vec<PendingReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Local,
    Feed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub source: HitSource,
    pub url: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub image: Option<String>,
    pub rss_pub_date: Option<DateTime<Utc>>,
    /// Known only for works already in the database.
    pub status: Option<WorkStatus>,
    pub work_id: Option<i64>,
    pub already_tracked: bool,
}

impl SearchHit {
    pub fn local(work: &Work, already_tracked: bool) -> Self {
        Self {
            source: HitSource::Local,
            url: work.url.clone(),
            name: work.name.clone(),
            version: work.version.clone(),
            author: work.author.clone(),
            image: work.image.clone(),
            rss_pub_date: work.rss_pub_date,
            status: Some(work.status),
            work_id: Some(work.id),
            already_tracked,
        }
    }

    pub fn feed(entry: &FeedEntry, work_id: Option<i64>, already_tracked: bool) -> Self {
        Self {
            source: HitSource::Feed,
            url: entry.url.clone(),
            name: entry.name.clone(),
            version: entry.version.clone(),
            author: entry.author.clone(),
            image: entry.image.clone(),
            rss_pub_date: entry.pub_date,
            status: None,
            work_id,
            already_tracked,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Set when the live feed could not be queried.
    pub feed_error: Option<String>,
}
