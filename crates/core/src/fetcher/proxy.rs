//! Proxy pool loaded from public proxy lists.
//!
//! The pool is an immutable snapshot behind a lock; refresh swaps in a new
//! snapshot. Selection is a stateless random pick, so a bad proxy never
//! penalises the pool.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex_lite::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::FetcherConfig;

use super::transport::HttpTransport;
use super::types::FetchRequest;

static IP_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d+$").expect("valid proxy pattern")
});

const LIST_TIMEOUT: Duration = Duration::from_secs(15);

/// How long an empty pool is kept before the lists are downloaded again.
const EMPTY_POOL_RETRY: Duration = Duration::from_secs(300);

/// Transport scheme the HTTP client needs for a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    /// SOCKS5 with remote DNS resolution
    Socks5h,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Socks5h => "socks5h",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "http" | "https" => Some(ProxyScheme::Http),
            "socks5" | "socks5h" => Some(ProxyScheme::Socks5h),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEntry {
    pub scheme: ProxyScheme,
    /// `ip:port`
    pub address: String,
}

impl ProxyEntry {
    pub fn new(scheme: ProxyScheme, address: impl Into<String>) -> Self {
        Self {
            scheme,
            address: address.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.address)
    }
}

impl fmt::Display for ProxyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// A remote list and the scheme its entries default to.
#[derive(Debug, Clone)]
pub struct ProxySource {
    pub url: String,
    pub scheme: ProxyScheme,
}

/// Parse a proxy list body.
///
/// Lines may hold several space-separated entries. An entry is `ip:port`,
/// optionally prefixed with `scheme://`; a recognised prefix overrides the
/// list's default scheme. Anything else is ignored.
pub fn parse_proxy_list(body: &str, default_scheme: ProxyScheme) -> Vec<ProxyEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for token in body.lines().flat_map(str::split_whitespace) {
        let (scheme, address) = match token.split_once("://") {
            Some((prefix, rest)) => match ProxyScheme::from_prefix(prefix) {
                Some(scheme) => (scheme, rest.trim_end_matches('/')),
                None => continue,
            },
            None => (default_scheme, token),
        };

        if !IP_PORT.is_match(address) {
            continue;
        }

        let entry = ProxyEntry::new(scheme, address);
        if seen.insert(entry.clone()) {
            entries.push(entry);
        }
    }

    entries
}

struct Snapshot {
    entries: Arc<Vec<ProxyEntry>>,
    loaded_at: Instant,
}

impl Snapshot {
    fn new(entries: Vec<ProxyEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
            loaded_at: Instant::now(),
        }
    }
}

pub struct ProxyPool {
    sources: Vec<ProxySource>,
    snapshot: RwLock<Option<Snapshot>>,
    load_lock: Mutex<()>,
    empty_retry: Duration,
}

impl ProxyPool {
    pub fn new(sources: Vec<ProxySource>) -> Self {
        Self {
            sources,
            snapshot: RwLock::new(None),
            load_lock: Mutex::new(()),
            empty_retry: EMPTY_POOL_RETRY,
        }
    }

    /// Override how long an empty load is kept before retrying.
    pub fn with_empty_retry(mut self, retry: Duration) -> Self {
        self.empty_retry = retry;
        self
    }

    pub fn from_config(config: &FetcherConfig) -> Self {
        Self::new(vec![
            ProxySource {
                url: config.https_proxy_list_url.clone(),
                scheme: ProxyScheme::Http,
            },
            ProxySource {
                url: config.socks5_proxy_list_url.clone(),
                scheme: ProxyScheme::Socks5h,
            },
        ])
    }

    /// Pool with a fixed, already loaded set of entries.
    pub fn with_entries(entries: Vec<ProxyEntry>) -> Self {
        Self {
            sources: Vec::new(),
            snapshot: RwLock::new(Some(Snapshot::new(entries))),
            load_lock: Mutex::new(()),
            empty_retry: EMPTY_POOL_RETRY,
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Nothing loaded yet, or the last load came back empty and has aged out.
    async fn needs_load(&self) -> bool {
        match self.snapshot.read().await.as_ref() {
            None => true,
            Some(snapshot) => {
                !self.sources.is_empty()
                    && snapshot.entries.is_empty()
                    && snapshot.loaded_at.elapsed() >= self.empty_retry
            }
        }
    }

    /// Load the lists once. Concurrent callers wait for the first load.
    /// An empty result is retried after a cooldown.
    pub async fn ensure_loaded(&self, transport: &dyn HttpTransport) {
        if !self.needs_load().await {
            return;
        }
        let _guard = self.load_lock.lock().await;
        if !self.needs_load().await {
            return;
        }
        self.refresh(transport).await;
    }

    /// Re-download every list and swap the snapshot. Returns the new pool size.
    pub async fn refresh(&self, transport: &dyn HttpTransport) -> usize {
        let downloads = self.sources.iter().map(|source| async move {
            let request = FetchRequest::get(&source.url);
            match transport.execute(&request, None, LIST_TIMEOUT).await {
                Ok(resp) if resp.status == 200 => {
                    let entries = parse_proxy_list(&resp.text(), source.scheme);
                    debug!(url = %source.url, count = entries.len(), "Loaded proxy list");
                    entries
                }
                Ok(resp) => {
                    error!(url = %source.url, status = resp.status, "Proxy list download failed");
                    Vec::new()
                }
                Err(e) => {
                    error!(url = %source.url, error = %e, "Proxy list download failed");
                    Vec::new()
                }
            }
        });

        let mut merged: Vec<ProxyEntry> = futures::future::join_all(downloads)
            .await
            .into_iter()
            .flatten()
            .collect();
        merged.shuffle(&mut rand::thread_rng());

        let count = merged.len();
        *self.snapshot.write().await = Some(Snapshot::new(merged));
        if count == 0 {
            warn!(retry_secs = self.empty_retry.as_secs(), "Proxy pool is empty");
        } else {
            info!(count, "Proxy pool refreshed");
        }
        count
    }

    /// Random entry from the current snapshot.
    pub async fn choose(&self) -> Option<ProxyEntry> {
        let entries = self.snapshot.read().await.as_ref().map(|s| Arc::clone(&s.entries))?;
        entries.choose(&mut rand::thread_rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::fetcher::{FetchResponse, TransportError};

    #[test]
    fn test_parse_plain_and_prefixed_entries() {
        let body = "1.2.3.4:8080\nsocks5://5.6.7.8:1080 9.9.9.9:3128\n\nnot-a-proxy\n10.0.0.1\n";
        let entries = parse_proxy_list(body, ProxyScheme::Http);
        assert_eq!(
            entries,
            vec![
                ProxyEntry::new(ProxyScheme::Http, "1.2.3.4:8080"),
                ProxyEntry::new(ProxyScheme::Socks5h, "5.6.7.8:1080"),
                ProxyEntry::new(ProxyScheme::Http, "9.9.9.9:3128"),
            ]
        );
    }

    #[test]
    fn test_parse_ignores_unknown_scheme_and_duplicates() {
        let body = "ftp://1.1.1.1:21\n2.2.2.2:80\n2.2.2.2:80\n";
        let entries = parse_proxy_list(body, ProxyScheme::Socks5h);
        assert_eq!(entries, vec![ProxyEntry::new(ProxyScheme::Socks5h, "2.2.2.2:80")]);
    }

    #[test]
    fn test_entry_url() {
        let entry = ProxyEntry::new(ProxyScheme::Socks5h, "5.6.7.8:1080");
        assert_eq!(entry.url(), "socks5h://5.6.7.8:1080");
    }

    #[tokio::test]
    async fn test_refresh_merges_lists_and_survives_failure() {
        let transport = MockTransport::new();
        transport
            .respond("https://lists/http.txt", FetchResponse::new(200, "https://lists/http.txt", "1.1.1.1:80\n2.2.2.2:81"))
            .await;
        transport
            .respond("https://lists/socks.txt", FetchResponse::new(500, "https://lists/socks.txt", ""))
            .await;

        let pool = ProxyPool::new(vec![
            ProxySource { url: "https://lists/http.txt".into(), scheme: ProxyScheme::Http },
            ProxySource { url: "https://lists/socks.txt".into(), scheme: ProxyScheme::Socks5h },
        ]);
        assert!(!pool.is_loaded().await);

        pool.ensure_loaded(&transport).await;
        assert_eq!(pool.len().await, 2);

        // Second call does not download again
        pool.ensure_loaded(&transport).await;
        assert_eq!(transport.calls().await.len(), 2);

        let picked = pool.choose().await.unwrap();
        assert_eq!(picked.scheme, ProxyScheme::Http);
    }

    fn sources() -> Vec<ProxySource> {
        vec![
            ProxySource { url: "https://lists/http.txt".into(), scheme: ProxyScheme::Http },
            ProxySource { url: "https://lists/socks.txt".into(), scheme: ProxyScheme::Socks5h },
        ]
    }

    #[tokio::test]
    async fn test_failed_first_load_is_retried() {
        let transport = MockTransport::new();
        transport
            .fail("https://lists/http.txt", TransportError::Connect("refused".into()))
            .await;
        transport
            .fail("https://lists/socks.txt", TransportError::Timeout)
            .await;
        let pool = ProxyPool::new(sources()).with_empty_retry(Duration::ZERO);

        pool.ensure_loaded(&transport).await;
        assert!(pool.is_loaded().await);
        assert!(pool.is_empty().await);

        transport
            .respond("https://lists/http.txt", FetchResponse::new(200, "https://lists/http.txt", "1.1.1.1:80\n2.2.2.2:81"))
            .await;
        pool.ensure_loaded(&transport).await;
        assert_eq!(pool.len().await, 2);
        assert!(pool.choose().await.is_some());

        // A non-empty pool is kept
        pool.ensure_loaded(&transport).await;
        assert_eq!(transport.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_pool_waits_for_cooldown() {
        let transport = MockTransport::new();
        let pool = ProxyPool::new(sources());

        pool.ensure_loaded(&transport).await;
        pool.ensure_loaded(&transport).await;
        assert_eq!(transport.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_choose_on_empty_pool() {
        let pool = ProxyPool::with_entries(Vec::new());
        assert!(pool.is_loaded().await);
        assert!(pool.choose().await.is_none());
    }
}
