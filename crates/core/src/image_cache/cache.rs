use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ImageCacheConfig;
use crate::fetcher::{FetchError, ResilientFetcher};

use super::ImageCacher;

/// Extensions the cache will store, in lookup order.
const KNOWN_EXTENSIONS: &[&str] = &[".jpg", ".png", ".gif", ".webp", ".bmp", ".tiff"];

#[derive(Debug, Error)]
pub enum ImageCacheError {
    #[error("Image fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Image fetch returned HTTP {0}")]
    Status(u16),

    #[error("Unrecognised image type for {0}")]
    UnknownType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Map a media type to a file extension.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/bmp" | "image/x-ms-bmp" => Some(".bmp"),
        "image/tiff" => Some(".tiff"),
        _ => None,
    }
}

/// Extension of the URL path, when it is one the cache knows.
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_ascii_lowercase();
    let (_, ext) = last.rsplit_once('.')?;
    match ext {
        "jpg" | "jpeg" => Some(".jpg"),
        "png" => Some(".png"),
        "gif" => Some(".gif"),
        "webp" => Some(".webp"),
        "bmp" => Some(".bmp"),
        "tif" | "tiff" => Some(".tiff"),
        _ => None,
    }
}

fn url_hash(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

/// Filesystem-backed image cache.
pub struct ImageCache {
    fetcher: Arc<ResilientFetcher>,
    dir: PathBuf,
    web_prefix: String,
}

impl ImageCache {
    pub fn new(fetcher: Arc<ResilientFetcher>, config: &ImageCacheConfig) -> Self {
        Self {
            fetcher,
            dir: config.dir.clone(),
            web_prefix: config.web_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn web_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.web_prefix, file_name)
    }

    /// File name inside the cache dir for a local reference.
    fn file_name_of<'a>(&self, reference: &'a str) -> Option<&'a str> {
        let name = reference
            .strip_prefix(self.web_prefix.as_str())?
            .strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return None;
        }
        Some(name)
    }

    async fn existing(&self, hash: &str) -> Option<String> {
        for ext in KNOWN_EXTENSIONS {
            let name = format!("{hash}{ext}");
            if tokio::fs::try_exists(self.dir.join(&name))
                .await
                .unwrap_or(false)
            {
                return Some(name);
            }
        }
        None
    }

    /// Write `bytes` as `hash+ext` and drop any copy stored under another extension.
    async fn store(&self, hash: &str, ext: &str, bytes: &[u8]) -> Result<String, ImageCacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!("{hash}{ext}");
        let tmp = self.dir.join(format!("{name}.part"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(&name)).await?;

        for other in KNOWN_EXTENSIONS.iter().filter(|e| **e != ext) {
            let stale = self.dir.join(format!("{hash}{other}"));
            if tokio::fs::remove_file(&stale).await.is_ok() {
                debug!(path = %stale.display(), "Removed image cached under previous extension");
            }
        }

        Ok(name)
    }

    async fn download(&self, url: &str) -> Result<String, ImageCacheError> {
        let hash = url_hash(url);
        if let Some(name) = self.existing(&hash).await {
            return Ok(name);
        }

        let response = self.fetcher.get(url).await?;
        if response.status != 200 {
            return Err(ImageCacheError::Status(response.status));
        }

        let ext = response
            .content_type()
            .as_deref()
            .and_then(extension_for_content_type)
            .or_else(|| extension_from_url(url))
            .ok_or_else(|| ImageCacheError::UnknownType(url.to_string()))?;

        self.store(&hash, ext, &response.body).await
    }
}

#[async_trait]
impl ImageCacher for ImageCache {
    async fn cache(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return None;
        }

        match self.download(url).await {
            Ok(name) => Some(self.web_path(&name)),
            Err(e) => {
                warn!(url = %url, error = %e, "Image not cached");
                None
            }
        }
    }

    fn is_local_reference(&self, reference: &str) -> bool {
        self.file_name_of(reference).is_some()
    }

    fn local_file_exists(&self, reference: &str) -> bool {
        self.file_name_of(reference)
            .map(|name| self.dir.join(name).is_file())
            .unwrap_or(false)
    }
}
