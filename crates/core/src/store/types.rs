//! Persisted entities: works, users, tracking rows and their state triples.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::FeedEntry;
use crate::thread_page::{DownloadLink, NOT_FOUND};

/// Lifecycle of a work on the forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    OnHold,
    Abandoned,
}

impl WorkStatus {
    /// Column value.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            WorkStatus::Unknown => "UNKNOWN",
            WorkStatus::Ongoing => "ONGOING",
            WorkStatus::Completed => "COMPLETED",
            WorkStatus::OnHold => "ON_HOLD",
            WorkStatus::Abandoned => "ABANDONED",
        }
    }

    /// Lenient parse accepting column values and display labels.
    pub fn parse(value: &str) -> WorkStatus {
        let normalised: String = value
            .trim()
            .to_ascii_uppercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalised.as_str() {
            "ONGOING" => WorkStatus::Ongoing,
            "COMPLETED" => WorkStatus::Completed,
            "ON_HOLD" | "ONHOLD" | "HIATUS" => WorkStatus::OnHold,
            "ABANDONED" => WorkStatus::Abandoned,
            _ => WorkStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkStatus::Unknown => "Unknown",
            WorkStatus::Ongoing => "Ongoing",
            WorkStatus::Completed => "Completed",
            WorkStatus::OnHold => "On Hold",
            WorkStatus::Abandoned => "Abandoned",
        }
    }

    /// Completed, abandoned or on hold.
    pub fn is_inactive(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Abandoned | WorkStatus::OnHold)
    }

    /// Completed and abandoned works are left out of periodic syncs.
    pub fn excluded_from_sync(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Abandoned)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// (version, feed date, status) snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateTriple {
    pub version: Option<String>,
    pub rss_date: Option<DateTime<Utc>>,
    pub status: Option<WorkStatus>,
}

impl StateTriple {
    pub fn new(version: impl Into<String>, rss_date: Option<DateTime<Utc>>, status: WorkStatus) -> Self {
        Self {
            version: Some(version.into()),
            rss_date,
            status: Some(status),
        }
    }
}

/// Forum-side artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: i64,
    pub url: String,
    pub thread_id: Option<u64>,
    pub name: String,
    pub version: String,
    pub author: String,
    /// Cache web path or remote URL
    pub image: Option<String>,
    pub rss_pub_date: Option<DateTime<Utc>>,
    pub status: WorkStatus,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub engine: Option<String>,
    pub language: Option<String>,
    pub censorship: Option<String>,
    pub tags: Vec<String>,
    pub download_links: Vec<DownloadLink>,
    pub download_raw_html: Option<String>,
    pub os_list: Option<String>,
    pub release_date: Option<String>,
    pub thread_updated: Option<String>,
    pub first_added: DateTime<Utc>,
    pub last_seen_on_feed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_scraped: Option<DateTime<Utc>>,
}

fn is_missing(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|v| v.trim().is_empty() || v == NOT_FOUND)
        .unwrap_or(true)
}

impl Work {
    pub fn observed(&self) -> StateTriple {
        StateTriple::new(self.version.clone(), self.rss_pub_date, self.status)
    }

    /// Description or engine never resolved.
    pub fn has_missing_details(&self) -> bool {
        is_missing(&self.description) || is_missing(&self.engine)
    }

    pub fn tags_missing(&self) -> bool {
        self.tags.is_empty() || self.tags.iter().all(|t| t == NOT_FOUND)
    }

    /// Links absent or replaced by the forum's logged-out placeholder.
    pub fn links_missing(&self) -> bool {
        self.download_links.is_empty()
            || self
                .download_links
                .iter()
                .any(|l| l.text.to_ascii_lowercase().contains("log in or register"))
    }

    pub fn has_platform_link(&self) -> bool {
        self.download_links.iter().any(|l| l.os.is_platform())
    }
}

/// Fields known when a work is first seen.
#[derive(Debug, Clone, Default)]
pub struct NewWork {
    pub url: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub rss_pub_date: Option<DateTime<Utc>>,
    /// Stamp `last_seen_on_feed` when stored.
    pub seen_on_feed: bool,
}

impl NewWork {
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn from_feed(entry: &FeedEntry) -> Self {
        Self {
            url: entry.url.clone(),
            name: Some(entry.name.clone()),
            version: Some(entry.version.clone()),
            author: Some(entry.author.clone()),
            image: entry.image.clone(),
            rss_pub_date: entry.pub_date,
            seen_on_feed: true,
        }
    }
}

/// Partial update to a work, applied as one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkUpdate {
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub rss_pub_date: Option<DateTime<Utc>>,
    pub status: Option<WorkStatus>,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub engine: Option<String>,
    pub language: Option<String>,
    pub censorship: Option<String>,
    pub tags: Option<Vec<String>>,
    pub download_links: Option<Vec<DownloadLink>>,
    pub download_raw_html: Option<String>,
    pub os_list: Option<String>,
    pub release_date: Option<String>,
    pub thread_updated: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub seen_on_feed_at: Option<DateTime<Utc>>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl WorkUpdate {
    /// Whether any content field changes. Bookkeeping timestamps do not count.
    pub fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.version.is_some()
            || self.author.is_some()
            || self.image.is_some()
            || self.rss_pub_date.is_some()
            || self.status.is_some()
            || self.description.is_some()
            || self.changelog.is_some()
            || self.engine.is_some()
            || self.language.is_some()
            || self.censorship.is_some()
            || self.tags.is_some()
            || self.download_links.is_some()
            || self.download_raw_html.is_some()
            || self.os_list.is_some()
            || self.release_date.is_some()
            || self.thread_updated.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
            && self.scraped_at.is_none()
            && self.seen_on_feed_at.is_none()
            && self.checked_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a tracking row needs acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    Version,
    RssDate,
    Status,
}

/// A user's record about one work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingRow {
    pub id: i64,
    pub user_id: i64,
    pub work: Work,
    pub notes: Option<String>,
    pub rating: Option<f64>,
    pub notify: bool,
    pub date_added: DateTime<Utc>,
    pub last_notified: StateTriple,
    pub acknowledged: StateTriple,
}

impl TrackingRow {
    pub fn observed(&self) -> StateTriple {
        self.work.observed()
    }

    pub fn pending_reasons(&self) -> Vec<PendingReason> {
        let observed = self.observed();
        let mut reasons = Vec::new();
        if observed.version != self.acknowledged.version {
            reasons.push(PendingReason::Version);
        }
        if observed.rss_date != self.acknowledged.rss_date {
            reasons.push(PendingReason::RssDate);
        }
        if observed.status != self.acknowledged.status {
            reasons.push(PendingReason::Status);
        }
        reasons
    }

    pub fn needs_acknowledgement(&self) -> bool {
        !self.pending_reasons().is_empty()
    }
}

/// User edits to a tracking row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackingUpdate {
    pub notes: Option<String>,
    /// `Some(None)` clears the rating
    #[serde(default, with = "double_option")]
    pub rating: Option<Option<f64>>,
    pub notify: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Rating,
    LastUpdated,
    DateAdded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter for listing a user's tracking rows.
#[derive(Debug, Clone, Default)]
pub struct TrackingFilter {
    pub name_contains: Option<String>,
    pub min_rating: Option<f64>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl TrackingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_contains = Some(name.into());
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn sorted_by(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }
}
