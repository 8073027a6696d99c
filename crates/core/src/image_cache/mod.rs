//! Local cache for cover images.
//!
//! Images are stored once under `sha256(url)` plus an extension derived from
//! the response content type, and served by the web layer under a fixed prefix.

mod cache;

pub use cache::{extension_for_content_type, extension_from_url, ImageCache, ImageCacheError};

use async_trait::async_trait;

/// Contract the feed client and change detector rely on.
#[async_trait]
pub trait ImageCacher: Send + Sync {
    /// Cache a remote image. Returns the stable web path, or `None` when the
    /// image could not be fetched or its type is not recognised.
    async fn cache(&self, url: &str) -> Option<String>;

    /// Whether a stored image reference points into this cache.
    fn is_local_reference(&self, reference: &str) -> bool;

    /// Whether the file behind a local reference is present on disk.
    fn local_file_exists(&self, reference: &str) -> bool;
}
