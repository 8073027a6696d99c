//! Mock image cache for testing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::image_cache::ImageCacher;

const PREFIX: &str = "/images/";

/// Mock implementation of [`ImageCacher`].
///
/// Every URL caches to `/images/<sha256>.jpg` unless marked as failing.
/// Files are present unless marked missing.
#[derive(Debug, Default)]
pub struct MockImageCache {
    cached: Arc<RwLock<Vec<String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    // std lock: the existence check is synchronous
    missing: Arc<std::sync::RwLock<HashSet<String>>>,
}

impl MockImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_for(url: &str) -> String {
        format!("{PREFIX}{:x}.jpg", Sha256::digest(url.as_bytes()))
    }

    /// Remote URLs passed to `cache`, in order.
    pub async fn cached_urls(&self) -> Vec<String> {
        self.cached.read().await.clone()
    }

    pub async fn fail_url(&self, url: &str) {
        self.failing.write().await.insert(url.to_string());
    }

    /// Pretend the file behind `reference` was deleted.
    pub async fn set_missing(&self, reference: &str) {
        if let Ok(mut missing) = self.missing.write() {
            missing.insert(reference.to_string());
        }
    }
}

#[async_trait]
impl ImageCacher for MockImageCache {
    async fn cache(&self, url: &str) -> Option<String> {
        self.cached.write().await.push(url.to_string());
        if self.failing.read().await.contains(url) {
            return None;
        }
        Some(Self::path_for(url))
    }

    fn is_local_reference(&self, reference: &str) -> bool {
        reference.starts_with(PREFIX)
    }

    fn local_file_exists(&self, reference: &str) -> bool {
        self.missing
            .read()
            .map(|missing| !missing.contains(reference))
            .unwrap_or(false)
    }
}
