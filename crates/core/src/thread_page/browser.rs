//! Scraper driving a browser session: login, spoiler expansion, parse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{ForumConfig, ScraperConfig};
use crate::metrics;

use super::parser::parse_thread_page;
use super::{BrowserLauncher, BrowserSession, Credentials, ScrapeError, ThreadRecord, ThreadScraper};

const LOGIN_FIELD: &str = "input[name='login']";
const PASSWORD_FIELD: &str = "input[name='password']";
const LOGIN_BUTTON: &str = "button.button--primary";
const LOGIN_ERROR: &str = ".blockMessage.blockMessage--error";
const LOGGED_IN_MARKERS: &[&str] = &["a[href='/logout/']", ".p-account", "span.avatar[data-user-id]"];
const SPOILER_BUTTONS: &str = "button.bbCodeSpoiler-button";

/// Thread scraper over any [`BrowserLauncher`].
pub struct BrowserThreadScraper {
    launcher: Arc<dyn BrowserLauncher>,
    login_url: String,
    spoiler_wait: Duration,
    settle_wait: Duration,
}

impl BrowserThreadScraper {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, forum: &ForumConfig, config: &ScraperConfig) -> Self {
        Self {
            launcher,
            login_url: forum.login_endpoint(),
            spoiler_wait: Duration::from_millis(config.spoiler_wait_ms),
            settle_wait: Duration::from_millis(config.settle_wait_ms),
        }
    }

    /// Log in; `Ok(false)` when the forum rejected the credentials.
    async fn login(&self, session: &dyn BrowserSession, credentials: &Credentials) -> Result<bool, ScrapeError> {
        session.navigate(&self.login_url).await?;

        let field = session.find_elements(LOGIN_FIELD).await?;
        let password = session.find_elements(PASSWORD_FIELD).await?;
        let (Some(field), Some(password)) = (field.first(), password.first()) else {
            // Already logged in via an earlier cookie, or the form changed
            return self.logged_in(session).await;
        };

        session.type_into(field, &credentials.username).await?;
        session.type_into(password, &credentials.password).await?;

        let buttons = session.find_elements(LOGIN_BUTTON).await?;
        let Some(button) = buttons.first() else {
            return Err(ScrapeError::Command {
                command: "login".to_string(),
                message: "submit button not found".to_string(),
            });
        };
        session.click(button).await?;
        tokio::time::sleep(self.settle_wait).await;

        if self.logged_in(session).await? {
            return Ok(true);
        }
        if !session.find_elements(LOGIN_ERROR).await?.is_empty() {
            debug!("Forum displayed a login error");
        }
        Ok(false)
    }

    async fn logged_in(&self, session: &dyn BrowserSession) -> Result<bool, ScrapeError> {
        for marker in LOGGED_IN_MARKERS {
            if !session.find_elements(marker).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Click every spoiler toggle once so hidden content joins the DOM.
    async fn expand_spoilers(&self, session: &dyn BrowserSession) -> Result<usize, ScrapeError> {
        let buttons = session.find_elements(SPOILER_BUTTONS).await?;
        let mut expanded = 0;
        for button in &buttons {
            match session.click(button).await {
                Ok(()) => expanded += 1,
                Err(e) => debug!(error = %e, "Spoiler click failed"),
            }
            tokio::time::sleep(self.spoiler_wait).await;
        }
        Ok(expanded)
    }

    async fn scrape_with(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ThreadRecord, ScrapeError> {
        match credentials {
            Some(credentials) => match self.login(session, credentials).await {
                Ok(true) => info!(username = %credentials.username, "Logged in to forum"),
                Ok(false) => warn!(
                    username = %credentials.username,
                    "Forum login failed, scraping anonymously"
                ),
                Err(e) => warn!(error = %e, "Forum login errored, scraping anonymously"),
            },
            None => debug!("No forum credentials, scraping anonymously"),
        }

        session.navigate(url).await?;
        tokio::time::sleep(self.settle_wait).await;
        if let Ok(landed) = session.current_url().await {
            if landed != url {
                debug!(requested = %url, landed = %landed, "Thread navigation redirected");
            }
        }
        let expanded = self.expand_spoilers(session).await?;
        debug!(url = %url, expanded, "Spoilers expanded");

        let html = session.page_source().await?;
        if html.trim().is_empty() {
            return Err(ScrapeError::NoContent(url.to_string()));
        }
        Ok(parse_thread_page(&html, url))
    }
}

#[async_trait]
impl ThreadScraper for BrowserThreadScraper {
    async fn scrape(&self, url: &str, credentials: Option<&Credentials>) -> Result<ThreadRecord, ScrapeError> {
        let started = Instant::now();
        let session = self.launcher.launch().await.inspect_err(|_| {
            metrics::SCRAPES.with_label_values(&["failed"]).inc();
        })?;

        let result = self.scrape_with(session.as_ref(), url, credentials).await;
        // Quit failures are logged by the session
        let _ = session.quit().await;

        metrics::SCRAPE_DURATION
            .with_label_values(&[])
            .observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(record) => {
                metrics::SCRAPES.with_label_values(&["ok"]).inc();
                info!(url = %url, title = %record.title, links = record.download_links.len(), "Thread scraped");
            }
            Err(e) => {
                metrics::SCRAPES.with_label_values(&["failed"]).inc();
                warn!(url = %url, error = %e, "Thread scrape failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockBrowser};

    fn scraper(browser: Arc<MockBrowser>) -> BrowserThreadScraper {
        BrowserThreadScraper::new(
            browser,
            &ForumConfig {
                base_url: "https://forum.example".to_string(),
            },
            &ScraperConfig {
                spoiler_wait_ms: 0,
                settle_wait_ms: 0,
                ..Default::default()
            },
        )
    }

    const THREAD: &str = "https://forum.example/threads/eternum.4242/";

    #[tokio::test]
    async fn test_login_expand_and_parse() {
        let browser = Arc::new(MockBrowser::new(fixtures::thread_page_html()));
        browser.set_elements(LOGIN_FIELD, 1).await;
        browser.set_elements(PASSWORD_FIELD, 1).await;
        browser.set_elements(LOGIN_BUTTON, 1).await;
        browser.set_elements(SPOILER_BUTTONS, 2).await;
        browser.set_elements_after_click(".p-account", 1).await;

        let record = scraper(browser.clone())
            .scrape(THREAD, Some(&Credentials::new("reader", "secret")))
            .await
            .unwrap();
        assert_eq!(record.name, "Eternum");

        let log = browser.log().await;
        assert_eq!(log.visited, vec!["https://forum.example/login/login", THREAD]);
        assert_eq!(log.typed, vec!["reader", "secret"]);
        // Login submit plus two spoilers
        assert_eq!(log.clicks, 3);
        assert!(log.quit);
    }

    #[tokio::test]
    async fn test_failed_login_still_scrapes() {
        let browser = Arc::new(MockBrowser::new(fixtures::thread_page_html()));
        browser.set_elements(LOGIN_FIELD, 1).await;
        browser.set_elements(PASSWORD_FIELD, 1).await;
        browser.set_elements(LOGIN_BUTTON, 1).await;
        browser.set_elements(LOGIN_ERROR, 1).await;

        let record = scraper(browser.clone())
            .scrape(THREAD, Some(&Credentials::new("reader", "wrong")))
            .await
            .unwrap();
        assert_eq!(record.version, "v0.7 Public");
        assert_eq!(browser.log().await.visited.last().map(String::as_str), Some(THREAD));
    }

    #[tokio::test]
    async fn test_anonymous_skips_login() {
        let browser = Arc::new(MockBrowser::new(fixtures::thread_page_html()));
        scraper(browser.clone()).scrape(THREAD, None).await.unwrap();
        assert_eq!(browser.log().await.visited, vec![THREAD]);
    }

    #[tokio::test]
    async fn test_empty_page_is_an_error_and_session_closes() {
        let browser = Arc::new(MockBrowser::new(String::new()));
        let result = scraper(browser.clone()).scrape(THREAD, None).await;
        assert!(matches!(result, Err(ScrapeError::NoContent(_))));
        assert!(browser.log().await.quit);
    }
}
