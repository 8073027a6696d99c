use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ForumConfig;
use crate::fetcher::{FetchRequest, ResilientFetcher};
use crate::image_cache::ImageCacher;
use crate::metrics;

use super::parser::{clean_author, extract_image_url, parse_feed_title, parse_rss};
use super::{FeedEntry, FeedError, FeedQuery, FeedSource};

/// Query params for a feed request, in the order the forum expects.
pub fn build_feed_params(query: &FeedQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("cmd".to_string(), "rss".to_string()),
        ("cat".to_string(), "games".to_string()),
        ("rows".to_string(), query.limit.to_string()),
    ];

    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        params.push(("search".to_string(), search.trim().to_string()));
    }
    if let Some(creator) = query.creator.as_deref().filter(|s| !s.trim().is_empty()) {
        params.push(("creator".to_string(), creator.trim().to_string()));
    }
    if let Some(status) = query.status {
        params.extend(
            status
                .prefix_params()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
    }

    params
}

/// Feed client over the resilient fetcher.
pub struct RssFeedClient {
    fetcher: Arc<ResilientFetcher>,
    images: Arc<dyn ImageCacher>,
    endpoint: String,
}

impl RssFeedClient {
    pub fn new(fetcher: Arc<ResilientFetcher>, images: Arc<dyn ImageCacher>, forum: &ForumConfig) -> Self {
        Self {
            fetcher,
            images,
            endpoint: forum.feed_endpoint(),
        }
    }

    async fn resolve_image(&self, remote: Option<String>, cache: bool) -> Option<String> {
        let remote = remote?;
        if !cache {
            return Some(remote);
        }
        match self.images.cache(&remote).await {
            Some(local) => Some(local),
            None => Some(remote),
        }
    }
}

#[async_trait]
impl FeedSource for RssFeedClient {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<Vec<FeedEntry>, FeedError> {
        let request = FetchRequest::get(&self.endpoint).with_params(build_feed_params(query));
        let display_url = request.display_url();
        debug!(url = %display_url, "Fetching feed");

        let response = match self.fetcher.fetch(request).await {
            Ok(r) => r,
            Err(e) => {
                metrics::FEED_REQUESTS
                    .with_label_values(&[query.filter_label(), "failed"])
                    .inc();
                warn!(url = %display_url, error = %e, "Feed fetch failed");
                return Err(FeedError::Unreachable(e.to_string()));
            }
        };

        if response.status != 200 {
            metrics::FEED_REQUESTS
                .with_label_values(&[query.filter_label(), "failed"])
                .inc();
            warn!(url = %display_url, status = response.status, "Feed returned error status");
            return Err(FeedError::HttpStatus(response.status));
        }
        metrics::FEED_REQUESTS
            .with_label_values(&[query.filter_label(), "ok"])
            .inc();

        let mut entries = Vec::new();
        for item in parse_rss(&response.text()) {
            let url = item.link.trim().to_string();
            let parsed = parse_feed_title(&item.title);
            if parsed.name.is_empty() || url.is_empty() {
                continue;
            }

            let mut author = clean_author(&item.author);
            if author == "N/A" {
                if let Some(from_title) = parsed.author.clone() {
                    author = from_title;
                }
            }

            let image = self
                .resolve_image(extract_image_url(&item.description), query.cache_images)
                .await;

            entries.push(FeedEntry {
                name: parsed.name,
                version: parsed.version,
                author,
                url,
                pub_date: item.pub_date,
                image,
            });
        }

        info!(
            filter = query.filter_label(),
            search = ?query.search,
            creator = ?query.creator,
            count = entries.len(),
            "Feed fetched"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StatusFilter;
    use crate::fetcher::{FetchPolicy, FetchResponse, ProxyPool};
    use crate::testing::{fixtures, MockImageCache, MockTransport};
    use std::time::Duration;

    const ENDPOINT: &str = "https://forum.example/sam/latest_alpha/latest_data.php";

    fn client(transport: Arc<MockTransport>, images: Arc<MockImageCache>) -> RssFeedClient {
        let fetcher = ResilientFetcher::new(
            transport,
            Arc::new(ProxyPool::with_entries(Vec::new())),
            FetchPolicy {
                max_attempts: 2,
                timeout: Duration::from_secs(1),
                retry_delay: Duration::ZERO,
                use_proxies: false,
            },
        );
        RssFeedClient::new(
            Arc::new(fetcher),
            images,
            &ForumConfig {
                base_url: "https://forum.example".to_string(),
            },
        )
    }

    #[test]
    fn test_build_params_for_ongoing_search() {
        let query = FeedQuery::latest(50)
            .with_search("Eternum")
            .with_status(StatusFilter::Ongoing);
        let params = build_feed_params(&query);
        let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("cmd", "rss"),
                ("cat", "games"),
                ("rows", "50"),
                ("search", "Eternum"),
                ("noprefixes[]", "18"),
                ("noprefixes[]", "20"),
                ("noprefixes[]", "22"),
            ]
        );
    }

    #[test]
    fn test_build_params_creator_only() {
        let query = FeedQuery::latest(10)
            .with_creator("Caribdis")
            .with_status(StatusFilter::Completed);
        let params = build_feed_params(&query);
        assert!(params.contains(&("creator".to_string(), "Caribdis".to_string())));
        assert!(params.contains(&("prefixes[]".to_string(), "18".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "search"));
    }

    #[tokio::test]
    async fn test_fetch_feed_parses_and_caches_images() {
        let transport = Arc::new(MockTransport::new());
        let body = fixtures::rss_document(&[fixtures::rss_item(
            "[UPDATE] Eternum [v0.7 Public] [Caribdis]",
            "https://forum.example/threads/eternum.4242/",
            "Caribdis <rss@f95>",
            "Sat, 18 May 2024 10:00:00 GMT",
            Some("https://attachments.example/eternum.png"),
        )]);
        transport.respond(ENDPOINT, FetchResponse::new(200, ENDPOINT, body)).await;
        let images = Arc::new(MockImageCache::new());
        let feed = client(transport.clone(), images.clone());

        let entries = feed.fetch_feed(&FeedQuery::latest(5)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Eternum");
        assert_eq!(entries[0].version, "v0.7 Public");
        assert_eq!(entries[0].author, "Caribdis");
        assert!(entries[0].image.as_deref().unwrap().starts_with("/images/"));
        assert_eq!(images.cached_urls().await, vec!["https://attachments.example/eternum.png"]);

        let calls = transport.calls().await;
        assert!(calls[0].url.contains("cmd=rss&cat=games&rows=5"));
    }

    #[tokio::test]
    async fn test_fetch_feed_without_image_cache_keeps_remote() {
        let transport = Arc::new(MockTransport::new());
        let body = fixtures::rss_document(&[fixtures::rss_item(
            "[NEW] Tales [v0.1]",
            "https://forum.example/threads/tales.99/",
            "",
            "Sat, 18 May 2024 10:00:00 GMT",
            Some("https://attachments.example/tales.png"),
        )]);
        transport.respond(ENDPOINT, FetchResponse::new(200, ENDPOINT, body)).await;
        let images = Arc::new(MockImageCache::new());
        let feed = client(transport, images.clone());

        let entries = feed
            .fetch_feed(&FeedQuery::latest(5).without_image_cache())
            .await
            .unwrap();
        assert_eq!(entries[0].image.as_deref(), Some("https://attachments.example/tales.png"));
        assert_eq!(entries[0].author, "N/A");
        assert!(images.cached_urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_feed_distinguishes_failure_from_empty() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(ENDPOINT, FetchResponse::new(404, ENDPOINT, "")).await;
        let feed = client(transport.clone(), Arc::new(MockImageCache::new()));
        assert!(matches!(
            feed.fetch_feed(&FeedQuery::latest(5)).await,
            Err(FeedError::HttpStatus(404))
        ));

        let transport = Arc::new(MockTransport::new());
        transport
            .respond(ENDPOINT, FetchResponse::new(200, ENDPOINT, fixtures::rss_document(&[])))
            .await;
        let feed = client(transport, Arc::new(MockImageCache::new()));
        assert!(feed.fetch_feed(&FeedQuery::latest(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_feed_unreachable() {
        let transport = Arc::new(MockTransport::new());
        let feed = client(transport, Arc::new(MockImageCache::new()));
        assert!(matches!(
            feed.fetch_feed(&FeedQuery::latest(5)).await,
            Err(FeedError::Unreachable(_))
        ));
    }
}
