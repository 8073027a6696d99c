//! Thread page scraping.
//!
//! The page needs scripted spoiler expansion, so scraping goes through a
//! real browser behind [`BrowserSession`]. Parsing the rendered HTML is pure
//! and lives in [`parse_thread_page`].

mod browser;
mod links;
mod parser;
mod title;
mod types;
mod webdriver;

pub use browser::BrowserThreadScraper;
pub use links::{classify_link, extract_download_links, os_list, prioritise_links};
pub use parser::parse_thread_page;
pub use title::{parse_thread_title, ThreadTitle};
pub use types::*;
pub use webdriver::{WebDriverLauncher, WebDriverSession};

use async_trait::async_trait;

/// Opaque WebDriver element reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Minimal browser automation surface.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    /// Rendered DOM as HTML.
    async fn page_source(&self) -> Result<String, ScrapeError>;

    async fn find_elements(&self, css: &str) -> Result<Vec<ElementHandle>, ScrapeError>;

    async fn type_into(&self, element: &ElementHandle, text: &str) -> Result<(), ScrapeError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), ScrapeError>;

    /// End the session and release the browser.
    async fn quit(&self) -> Result<(), ScrapeError>;
}

/// Creates browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

/// Scrapes one thread into a [`ThreadRecord`].
#[async_trait]
pub trait ThreadScraper: Send + Sync {
    /// Anonymous when `credentials` is `None` or the login fails.
    async fn scrape(&self, url: &str, credentials: Option<&Credentials>) -> Result<ThreadRecord, ScrapeError>;
}
