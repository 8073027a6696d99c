use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::WorkStatus;

/// Sentinel for fields the page did not yield.
pub const NOT_FOUND: &str = "Not found";

/// Platform bucket of a download link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOs {
    Win,
    Linux,
    Mac,
    Android,
    Extras,
    Monitor,
    SourceCode,
    Unknown,
}

impl LinkOs {
    /// Whether the link is a playable build for some platform.
    pub fn is_platform(&self) -> bool {
        !matches!(
            self,
            LinkOs::Extras | LinkOs::Monitor | LinkOs::SourceCode | LinkOs::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOs::Win => "win",
            LinkOs::Linux => "linux",
            LinkOs::Mac => "mac",
            LinkOs::Android => "android",
            LinkOs::Extras => "extras",
            LinkOs::Monitor => "monitor",
            LinkOs::SourceCode => "source_code",
            LinkOs::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LinkOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub text: String,
    pub url: String,
    pub os: LinkOs,
}

impl DownloadLink {
    pub fn new(text: impl Into<String>, url: impl Into<String>, os: LinkOs) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            os,
        }
    }
}

/// Everything extracted from a thread's first post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadRecord {
    pub url: String,
    /// Raw heading text
    pub title: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub tags: Vec<String>,
    pub description: String,
    pub changelog: String,
    pub download_links: Vec<DownloadLink>,
    pub engine: String,
    pub language: String,
    /// Raw status text as shown on the page
    pub status: String,
    pub censorship: String,
    pub release_date: String,
    pub thread_updated: String,
    pub os_list: String,
    /// Download section markup kept for re-classification
    pub download_raw_html: String,
    pub cover_image: Option<String>,
}

impl ThreadRecord {
    /// Record with every field unresolved.
    pub fn empty(url: impl Into<String>) -> Self {
        let nf = || NOT_FOUND.to_string();
        Self {
            url: url.into(),
            title: nf(),
            name: nf(),
            version: nf(),
            author: nf(),
            tags: Vec::new(),
            description: nf(),
            changelog: nf(),
            download_links: Vec::new(),
            engine: nf(),
            language: nf(),
            status: nf(),
            censorship: nf(),
            release_date: nf(),
            thread_updated: nf(),
            os_list: nf(),
            download_raw_html: String::new(),
            cover_image: None,
        }
    }

    pub fn work_status(&self) -> WorkStatus {
        WorkStatus::parse(&self.status)
    }
}

/// Returns `value` unless it is empty or the sentinel.
pub fn resolved(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == NOT_FOUND {
        None
    } else {
        Some(trimmed)
    }
}

/// Forum login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("Browser unavailable: {0}")]
    Browser(String),

    #[error("WebDriver command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Page {0} rendered no content")]
    NoContent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_buckets() {
        assert!(LinkOs::Win.is_platform());
        assert!(LinkOs::Android.is_platform());
        assert!(!LinkOs::Extras.is_platform());
        assert!(!LinkOs::SourceCode.is_platform());
        assert_eq!(serde_json::to_string(&LinkOs::SourceCode).unwrap(), "\"source_code\"");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("reader", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_resolved() {
        assert_eq!(resolved(" Ren'Py "), Some("Ren'Py"));
        assert_eq!(resolved(NOT_FOUND), None);
        assert_eq!(resolved(""), None);
    }
}
