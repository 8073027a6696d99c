pub mod config;
pub mod detector;
pub mod feed;
pub mod fetcher;
pub mod image_cache;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod store;
pub mod sync;
pub mod thread_page;

pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig};
pub use detector::{ChangeDetector, CheckOutcome, DetectError};
pub use feed::{FeedEntry, FeedError, FeedQuery, FeedSource, RssFeedClient, StatusFilter};
pub use fetcher::{FetchError, HttpTransport, ReqwestTransport, ResilientFetcher};
pub use image_cache::{ImageCache, ImageCacher};
pub use notify::{Notifier, PushMessage, PushoverNotifier};
pub use store::{SqliteTrackingStore, StoreError, TrackingStore, Work, WorkStatus};
pub use sync::{SyncError, SyncOrchestrator, SyncScheduler};
pub use thread_page::{BrowserThreadScraper, ThreadScraper, WebDriverLauncher};
