//! Forum RSS client.
//!
//! A single endpoint serves every feed variant; search term, creator and
//! lifecycle prefixes select what comes back.

mod client;
mod parser;
mod types;

pub use client::{build_feed_params, RssFeedClient};
pub use parser::{clean_author, extract_image_url, parse_feed_title, parse_rss, ParsedTitle, RawItem};
pub use types::*;

use async_trait::async_trait;

/// Source of feed entries.
///
/// `Err` means the feed could not be fetched at all; `Ok(vec![])` means it was
/// fetched and nothing matched.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, query: &FeedQuery) -> Result<Vec<FeedEntry>, FeedError>;
}
