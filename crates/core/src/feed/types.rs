use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::SearchStrategy;
use crate::store::WorkStatus;

/// Lifecycle filter expressed through forum prefix IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Ongoing,
    Completed,
    OnHold,
    Abandoned,
}

pub const PREFIX_COMPLETED: &str = "18";
pub const PREFIX_ON_HOLD: &str = "20";
pub const PREFIX_ABANDONED: &str = "22";

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Ongoing => "ongoing",
            StatusFilter::Completed => "completed",
            StatusFilter::OnHold => "on_hold",
            StatusFilter::Abandoned => "abandoned",
        }
    }

    /// Repeated-key query params for this filter.
    pub fn prefix_params(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            StatusFilter::Ongoing => vec![
                ("noprefixes[]", PREFIX_COMPLETED),
                ("noprefixes[]", PREFIX_ON_HOLD),
                ("noprefixes[]", PREFIX_ABANDONED),
            ],
            StatusFilter::Completed => vec![("prefixes[]", PREFIX_COMPLETED)],
            StatusFilter::OnHold => vec![("prefixes[]", PREFIX_ON_HOLD)],
            StatusFilter::Abandoned => vec![("prefixes[]", PREFIX_ABANDONED)],
        }
    }

    pub fn work_status(&self) -> WorkStatus {
        match self {
            StatusFilter::Ongoing => WorkStatus::Ongoing,
            StatusFilter::Completed => WorkStatus::Completed,
            StatusFilter::OnHold => WorkStatus::OnHold,
            StatusFilter::Abandoned => WorkStatus::Abandoned,
        }
    }
}

/// Parameters for one feed request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub search: Option<String>,
    pub creator: Option<String>,
    pub status: Option<StatusFilter>,
    pub limit: u32,
    /// Whether entry images go through the image cache
    pub cache_images: bool,
}

impl FeedQuery {
    /// Unfiltered latest entries.
    pub fn latest(limit: u32) -> Self {
        Self {
            search: None,
            creator: None,
            status: None,
            limit,
            cache_images: true,
        }
    }

    pub fn for_strategy(strategy: &SearchStrategy, status: Option<StatusFilter>, limit: u32) -> Self {
        Self {
            search: strategy.query.clone(),
            creator: strategy.creator.clone(),
            status,
            limit,
            cache_images: true,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    pub fn without_image_cache(mut self) -> Self {
        self.cache_images = false;
        self
    }

    pub fn filter_label(&self) -> &'static str {
        self.status.map(|s| s.as_str()).unwrap_or("none")
    }
}

/// One parsed feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub name: String,
    pub version: String,
    pub author: String,
    pub url: String,
    pub pub_date: Option<DateTime<Utc>>,
    /// Cache web path when caching succeeded, otherwise the remote URL
    pub image: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Feed unreachable: {0}")]
    Unreachable(String),

    #[error("Feed returned HTTP {0}")]
    HttpStatus(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_params() {
        assert_eq!(
            StatusFilter::Ongoing.prefix_params(),
            vec![("noprefixes[]", "18"), ("noprefixes[]", "20"), ("noprefixes[]", "22")]
        );
        assert_eq!(StatusFilter::OnHold.prefix_params(), vec![("prefixes[]", "20")]);
        assert_eq!(StatusFilter::Abandoned.prefix_params(), vec![("prefixes[]", "22")]);
    }

    #[test]
    fn test_query_from_strategy() {
        let q = FeedQuery::for_strategy(&SearchStrategy::creator("Caribdis"), Some(StatusFilter::Completed), 50);
        assert_eq!(q.search, None);
        assert_eq!(q.creator.as_deref(), Some("Caribdis"));
        assert_eq!(q.filter_label(), "completed");
    }
}
