use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub forum: ForumConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub image_cache: ImageCacheConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub push: PushConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("threadwatch.db")
}

/// Forum endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForumConfig {
    /// Scheme and host of the forum, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://f95zone.to".to_string()
}

impl ForumConfig {
    pub fn feed_endpoint(&self) -> String {
        format!(
            "{}/sam/latest_alpha/latest_data.php",
            self.base_url.trim_end_matches('/')
        )
    }

    pub fn login_endpoint(&self) -> String {
        format!("{}/login/login", self.base_url.trim_end_matches('/'))
    }
}

/// Resilient fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    /// Total attempts per request, the first one always direct
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-attempt timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Backoff after 429/5xx; doubled on 429
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whether failed direct attempts may escalate to proxies
    #[serde(default = "default_true")]
    pub use_proxies: bool,
    #[serde(default = "default_https_proxy_list")]
    pub https_proxy_list_url: String,
    #[serde(default = "default_socks5_proxy_list")]
    pub socks5_proxy_list_url: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout(),
            retry_delay_secs: default_retry_delay(),
            user_agent: default_user_agent(),
            use_proxies: true,
            https_proxy_list_url: default_https_proxy_list(),
            socks5_proxy_list_url: default_socks5_proxy_list(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    15
}

fn default_retry_delay() -> u64 {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_https_proxy_list() -> String {
    "https://raw.githubusercontent.com/vakhov/fresh-proxy-list/master/https.txt".to_string()
}

fn default_socks5_proxy_list() -> String {
    "https://raw.githubusercontent.com/vakhov/fresh-proxy-list/master/socks5.txt".to_string()
}

fn default_true() -> bool {
    true
}

/// Image cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageCacheConfig {
    #[serde(default = "default_image_dir")]
    pub dir: PathBuf,
    /// URL prefix the server mounts the cache directory under
    #[serde(default = "default_web_prefix")]
    pub web_prefix: String,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            dir: default_image_dir(),
            web_prefix: default_web_prefix(),
        }
    }
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("/data/image_cache")
}

fn default_web_prefix() -> String {
    "/images".to_string()
}

/// Headless browser scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// WebDriver endpoint (chromedriver, geckodriver or a selenium hub)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
    /// Wait after each spoiler click
    #[serde(default = "default_spoiler_wait")]
    pub spoiler_wait_ms: u64,
    /// Wait after login submit and after page loads
    #[serde(default = "default_settle_wait")]
    pub settle_wait_ms: u64,
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            page_timeout_secs: default_page_timeout(),
            spoiler_wait_ms: default_spoiler_wait(),
            settle_wait_ms: default_settle_wait(),
            headless: true,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_page_timeout() -> u64 {
    30
}

fn default_spoiler_wait() -> u64 {
    250
}

fn default_settle_wait() -> u64 {
    1500
}

/// Change detection tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// Minimum age of the last scrape before missing fields trigger a rescrape
    #[serde(default = "default_debounce_days")]
    pub debounce_days: i64,
    /// Rows requested per feed lookup
    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce_days: default_debounce_days(),
            feed_limit: default_feed_limit(),
        }
    }
}

fn default_debounce_days() -> i64 {
    3
}

fn default_feed_limit() -> u32 {
    50
}

/// Scheduler and ingestion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
    /// How often a disabled schedule is re-read
    #[serde(default = "default_disabled_recheck")]
    pub disabled_recheck_secs: u64,
    /// Rows pulled from the unfiltered feed during ingestion
    #[serde(default = "default_ingest_limit")]
    pub ingest_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scheduler_enabled: true,
            disabled_recheck_secs: default_disabled_recheck(),
            ingest_limit: default_ingest_limit(),
        }
    }
}

fn default_disabled_recheck() -> u64 {
    300
}

fn default_ingest_limit() -> u32 {
    35
}

/// Push notification service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    #[serde(default = "default_push_api_url")]
    pub api_url: String,
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            api_url: default_push_api_url(),
            timeout_secs: default_push_timeout(),
        }
    }
}

fn default_push_api_url() -> String {
    "https://api.pushover.net/1/messages.json".to_string()
}

fn default_push_timeout() -> u64 {
    10
}

/// Config view served by the API.
///
/// Proxy list URLs and the push endpoint are reduced to flags.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub forum: ForumConfig,
    pub fetcher: SanitizedFetcherConfig,
    pub image_cache: ImageCacheConfig,
    pub scraper: SanitizedScraperConfig,
    pub detector: DetectorConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFetcherConfig {
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub use_proxies: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedScraperConfig {
    pub webdriver_configured: bool,
    pub headless: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            forum: config.forum.clone(),
            fetcher: SanitizedFetcherConfig {
                max_attempts: config.fetcher.max_attempts,
                request_timeout_secs: config.fetcher.request_timeout_secs,
                use_proxies: config.fetcher.use_proxies,
            },
            image_cache: config.image_cache.clone(),
            scraper: SanitizedScraperConfig {
                webdriver_configured: !config.scraper.webdriver_url.is_empty(),
                headless: config.scraper.headless,
            },
            detector: config.detector.clone(),
            sync: config.sync.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "threadwatch.db");
        assert_eq!(config.fetcher.max_attempts, 5);
        assert_eq!(config.fetcher.retry_delay_secs, 5);
        assert!(config.fetcher.use_proxies);
        assert_eq!(config.sync.ingest_limit, 35);
    }

    #[test]
    fn test_forum_endpoints() {
        let forum = ForumConfig {
            base_url: "https://forum.example/".to_string(),
        };
        assert_eq!(
            forum.feed_endpoint(),
            "https://forum.example/sam/latest_alpha/latest_data.php"
        );
        assert_eq!(forum.login_endpoint(), "https://forum.example/login/login");
    }

    #[test]
    fn test_deserialize_partial_section() {
        let toml = r#"
[scraper]
webdriver_url = "http://chromedriver:9515"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.scraper.webdriver_url, "http://chromedriver:9515");
        assert_eq!(config.scraper.spoiler_wait_ms, 250);
        assert!(config.scraper.headless);
    }

    #[test]
    fn test_sanitized_config() {
        let config = Config::default();
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.server.port, 8080);
        assert!(sanitized.scraper.webdriver_configured);
        assert_eq!(sanitized.fetcher.max_attempts, 5);

        let json = serde_json::to_value(&sanitized).unwrap();
        assert!(json["fetcher"].get("https_proxy_list_url").is_none());
    }
}
