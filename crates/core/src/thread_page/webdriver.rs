//! W3C WebDriver client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ScraperConfig;

use super::{BrowserLauncher, BrowserSession, ElementHandle, ScrapeError};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Starts one browser session per scrape.
pub struct WebDriverLauncher {
    client: Client,
    base_url: String,
    user_agent: String,
    page_timeout: Duration,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(config: &ScraperConfig, user_agent: &str) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.page_timeout_secs + 10))
            .build()
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            page_timeout: Duration::from_secs(config.page_timeout_secs),
            headless: config.headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let url = format!("{}/session", self.base_url);
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities()), "new session").await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::Browser("WebDriver returned no session id".to_string()))?
            .to_string();
        debug!(session_id = %session_id, "WebDriver session started");

        let session = WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
        };
        session
            .command(
                Method::POST,
                "/timeouts",
                Some(json!({ "pageLoad": self.page_timeout.as_millis() as u64 })),
                "set timeouts",
            )
            .await?;

        Ok(Box::new(session))
    }
}

async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    command: &str,
) -> Result<Value, ScrapeError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_connect() {
            ScrapeError::Browser(format!("WebDriver unreachable: {e}"))
        } else {
            ScrapeError::Command {
                command: command.to_string(),
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| ScrapeError::Command {
        command: command.to_string(),
        message: format!("invalid response body: {e}"),
    })?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(ScrapeError::Command {
            command: command.to_string(),
            message: format!("{error}: {message}"),
        });
    }

    Ok(value)
}

/// One live WebDriver session.
pub struct WebDriverSession {
    client: Client,
    session_url: String,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        name: &str,
    ) -> Result<Value, ScrapeError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body, name).await
    }
}

/// Element references from a `find elements` result.
fn element_handles(value: &Value) -> Vec<ElementHandle> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(|id| ElementHandle(id.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })), "navigate")
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        let value = self.command(Method::GET, "/url", None, "current url").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&self) -> Result<String, ScrapeError> {
        let value = self.command(Method::GET, "/source", None, "page source").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_elements(&self, css: &str) -> Result<Vec<ElementHandle>, ScrapeError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": css })),
                "find elements",
            )
            .await?;
        Ok(element_handles(&value))
    }

    async fn type_into(&self, element: &ElementHandle, text: &str) -> Result<(), ScrapeError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(json!({ "text": text })),
            "send keys",
        )
        .await
        .map(|_| ())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), ScrapeError> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.0),
            Some(json!({})),
            "click",
        )
        .await
        .map(|_| ())
    }

    async fn quit(&self) -> Result<(), ScrapeError> {
        match self.command(Method::DELETE, "", None, "delete session").await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to close WebDriver session");
                Err(e)
            }
        }
    }
}
