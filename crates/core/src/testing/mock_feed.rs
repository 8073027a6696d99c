//! Mock feed source for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::feed::{FeedEntry, FeedError, FeedQuery, FeedSource, StatusFilter};

/// Mock implementation of [`FeedSource`].
///
/// Entries are registered per status filter (`None` is the unfiltered feed).
/// Search and creator terms are recorded but not applied, so every query for
/// a filter returns all of its entries, truncated to the query limit.
#[derive(Debug, Default)]
pub struct MockFeedSource {
    entries: Arc<RwLock<Vec<(Option<StatusFilter>, FeedEntry)>>>,
    queries: Arc<RwLock<Vec<FeedQuery>>>,
    next_error: Arc<RwLock<Option<FeedError>>>,
    always_fail: Arc<RwLock<bool>>,
}

impl MockFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_entry(&self, status: Option<StatusFilter>, entry: FeedEntry) {
        self.entries.write().await.push((status, entry));
    }

    /// Drop all entries. Recorded queries are kept.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn fail_next(&self, error: FeedError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every request fail as unreachable.
    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.always_fail.write().await = unreachable;
    }

    pub async fn queries(&self) -> Vec<FeedQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<Vec<FeedEntry>, FeedError> {
        self.queries.write().await.push(query.clone());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if *self.always_fail.read().await {
            return Err(FeedError::Unreachable("mock feed unreachable".to_string()));
        }

        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(status, _)| *status == query.status)
            .map(|(_, entry)| entry.clone())
            .take(query.limit as usize)
            .collect())
    }
}
