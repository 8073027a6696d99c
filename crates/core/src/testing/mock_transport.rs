//! Mock HTTP transport for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::fetcher::{FetchRequest, FetchResponse, HttpTransport, ProxyEntry, TransportError};

type Scripted = Result<FetchResponse, TransportError>;

/// A recorded attempt for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// URL including the query string.
    pub url: String,
    pub proxy: Option<ProxyEntry>,
}

#[derive(Debug, Clone, Default)]
struct Script {
    direct: Option<Scripted>,
    proxied: Option<Scripted>,
}

/// Mock implementation of [`HttpTransport`].
///
/// Outcomes are scripted per URL and repeat on every attempt. A request is
/// matched on its full URL first, then on its base URL. Unscripted URLs fail
/// with a connection error.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Arc<RwLock<HashMap<String, Script>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same response direct and through proxies.
    pub async fn respond(&self, url: &str, response: FetchResponse) {
        let mut scripts = self.scripts.write().await;
        let script = scripts.entry(url.to_string()).or_default();
        script.direct = Some(Ok(response.clone()));
        script.proxied = Some(Ok(response));
    }

    pub async fn respond_direct(&self, url: &str, response: FetchResponse) {
        let mut scripts = self.scripts.write().await;
        scripts.entry(url.to_string()).or_default().direct = Some(Ok(response));
    }

    pub async fn respond_proxied(&self, url: &str, response: FetchResponse) {
        let mut scripts = self.scripts.write().await;
        scripts.entry(url.to_string()).or_default().proxied = Some(Ok(response));
    }

    pub async fn fail(&self, url: &str, error: TransportError) {
        let mut scripts = self.scripts.write().await;
        let script = scripts.entry(url.to_string()).or_default();
        script.direct = Some(Err(error.clone()));
        script.proxied = Some(Err(error));
    }

    pub async fn fail_direct(&self, url: &str, error: TransportError) {
        let mut scripts = self.scripts.write().await;
        scripts.entry(url.to_string()).or_default().direct = Some(Err(error));
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEntry>,
        _timeout: Duration,
    ) -> Result<FetchResponse, TransportError> {
        let full_url = request.display_url();
        self.calls.write().await.push(RecordedCall {
            url: full_url.clone(),
            proxy: proxy.cloned(),
        });

        let scripts = self.scripts.read().await;
        let script = scripts.get(&full_url).or_else(|| scripts.get(&request.url));
        let outcome = script.and_then(|s| {
            if proxy.is_some() {
                s.proxied.clone()
            } else {
                s.direct.clone()
            }
        });
        outcome.unwrap_or_else(|| Err(TransportError::Connect(format!("no script for {full_url}"))))
    }
}
