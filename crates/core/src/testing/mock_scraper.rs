//! Mock thread scraper for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::thread_page::{Credentials, ScrapeError, ThreadRecord, ThreadScraper};

/// A recorded scrape for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedScrape {
    pub url: String,
    /// Username the scrape logged in with.
    pub username: Option<String>,
}

/// Mock implementation of [`ThreadScraper`].
///
/// Returns the record configured for a URL; unconfigured URLs fail with
/// [`ScrapeError::NoContent`].
#[derive(Debug, Default)]
pub struct MockScraper {
    records: Arc<RwLock<HashMap<String, Result<ThreadRecord, ScrapeError>>>>,
    calls: Arc<RwLock<Vec<RecordedScrape>>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_record(&self, url: &str, record: ThreadRecord) {
        self.records.write().await.insert(url.to_string(), Ok(record));
    }

    pub async fn fail(&self, url: &str, error: ScrapeError) {
        self.records.write().await.insert(url.to_string(), Err(error));
    }

    pub async fn calls(&self) -> Vec<RecordedScrape> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ThreadScraper for MockScraper {
    async fn scrape(&self, url: &str, credentials: Option<&Credentials>) -> Result<ThreadRecord, ScrapeError> {
        self.calls.write().await.push(RecordedScrape {
            url: url.to_string(),
            username: credentials.map(|c| c.username.clone()),
        });
        self.records
            .read()
            .await
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(ScrapeError::NoContent(url.to_string())))
    }
}
