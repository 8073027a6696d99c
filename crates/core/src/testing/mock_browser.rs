//! Scripted browser for testing the scraper flow.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::thread_page::{BrowserLauncher, BrowserSession, ElementHandle, ScrapeError};

/// What the scraper did to the browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserLog {
    pub visited: Vec<String>,
    pub typed: Vec<String>,
    pub clicks: usize,
    pub quit: bool,
}

#[derive(Debug, Default)]
struct State {
    html: String,
    elements: HashMap<String, usize>,
    /// Elements that only appear once something was clicked
    elements_after_click: HashMap<String, usize>,
    log: BrowserLog,
}

/// Mock [`BrowserLauncher`] whose sessions all share one scripted page.
///
/// `find_elements` returns as many handles as configured for the exact CSS
/// string; `page_source` always returns the configured HTML.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<RwLock<State>>,
}

impl MockBrowser {
    pub fn new(html: String) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                html,
                ..Default::default()
            })),
        }
    }

    pub async fn set_elements(&self, css: &str, count: usize) {
        self.state.write().await.elements.insert(css.to_string(), count);
    }

    pub async fn set_elements_after_click(&self, css: &str, count: usize) {
        self.state
            .write()
            .await
            .elements_after_click
            .insert(css.to_string(), count);
    }

    pub async fn log(&self) -> BrowserLog {
        self.state.read().await.log.clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrowserSession for MockBrowser {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.state.write().await.log.visited.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        Ok(self
            .state
            .read()
            .await
            .log
            .visited
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_source(&self) -> Result<String, ScrapeError> {
        Ok(self.state.read().await.html.clone())
    }

    async fn find_elements(&self, css: &str) -> Result<Vec<ElementHandle>, ScrapeError> {
        let state = self.state.read().await;
        let mut count = state.elements.get(css).copied().unwrap_or(0);
        if state.log.clicks > 0 {
            count += state.elements_after_click.get(css).copied().unwrap_or(0);
        }
        Ok((0..count).map(|i| ElementHandle(format!("{css}#{i}"))).collect())
    }

    async fn type_into(&self, _element: &ElementHandle, text: &str) -> Result<(), ScrapeError> {
        self.state.write().await.log.typed.push(text.to_string());
        Ok(())
    }

    async fn click(&self, _element: &ElementHandle) -> Result<(), ScrapeError> {
        self.state.write().await.log.clicks += 1;
        Ok(())
    }

    async fn quit(&self) -> Result<(), ScrapeError> {
        self.state.write().await.log.quit = true;
        Ok(())
    }
}
