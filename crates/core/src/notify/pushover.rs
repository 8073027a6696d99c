//! Pushover message API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::PushConfig;

use super::{Notifier, NotifyError, PushMessage, PushTarget};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    errors: Vec<String>,
}

pub struct PushoverNotifier {
    client: Client,
    api_url: String,
}

impl PushoverNotifier {
    pub fn new(config: &PushConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }
}

/// Form fields for one message.
fn form(target: &PushTarget, message: &PushMessage) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("token", target.api_token.clone()),
        ("user", target.user_key.clone()),
        ("title", message.title.clone()),
        ("message", message.body.clone()),
    ];
    if let Some(url) = &message.url {
        fields.push(("url", url.clone()));
    }
    if let Some(url_title) = &message.url_title {
        fields.push(("url_title", url_title.clone()));
    }
    fields
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&form(target, message))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(api) if (200..300).contains(&status) && api.status == 1 => {
                debug!(title = %message.title, "Pushover accepted message");
                Ok(())
            }
            Some(api) if !api.errors.is_empty() => Err(NotifyError::Rejected {
                status,
                message: api.errors.join("; "),
            }),
            _ => Err(NotifyError::Rejected {
                status,
                message: body.chars().take(200).collect(),
            }),
        }
    }
}
