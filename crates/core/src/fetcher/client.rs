//! The retry state machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::FetcherConfig;
use crate::metrics;

use super::proxy::{ProxyEntry, ProxyPool};
use super::transport::HttpTransport;
use super::types::{FetchError, FetchRequest, FetchResponse};

/// Retry bounds for one fetch call.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub use_proxies: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&FetcherConfig::default())
    }
}

impl From<&FetcherConfig> for FetchPolicy {
    fn from(config: &FetcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            timeout: Duration::from_secs(config.request_timeout_secs),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            use_proxies: config.use_proxies,
        }
    }
}

/// What to do after an attempt produced an HTTP status.
#[derive(Debug, PartialEq, Eq)]
enum StatusVerdict {
    Done,
    /// Escalate to proxies, retry immediately
    Escalate,
    /// Escalate to proxies, retry after backoff
    Backoff { multiplier: u32 },
}

fn classify_status(status: u16) -> StatusVerdict {
    match status {
        403 => StatusVerdict::Escalate,
        429 => StatusVerdict::Backoff { multiplier: 2 },
        s if s >= 500 => StatusVerdict::Backoff { multiplier: 1 },
        _ => StatusVerdict::Done,
    }
}

/// HTTP fetcher with direct-to-proxy escalation and bounded retries.
///
/// `fetch` returns `Ok` whenever any attempt got an HTTP response: the first
/// success, the first non-retryable error status, or the last retryable error
/// status once attempts run out. `Err(FetchError::Unreachable)` means no
/// attempt ever got a response.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    pool: Arc<ProxyPool>,
    policy: FetchPolicy,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, pool: Arc<ProxyPool>, policy: FetchPolicy) -> Self {
        Self {
            transport,
            pool,
            policy,
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch(FetchRequest::get(url)).await
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.display_url();
        let mut proxy_active = false;
        let mut last_response: Option<FetchResponse> = None;
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.policy.max_attempts {
            let proxy = if proxy_active {
                self.pick_proxy().await
            } else {
                None
            };
            let route = if proxy.is_some() { "proxy" } else { "direct" };
            debug!(url = %url, attempt, route, proxy = ?proxy.as_ref().map(ProxyEntry::url), "Fetch attempt");

            match self
                .transport
                .execute(&request, proxy.as_ref(), self.policy.timeout)
                .await
            {
                Ok(response) if response.is_success() => {
                    metrics::FETCH_ATTEMPTS.with_label_values(&[route, "ok"]).inc();
                    return Ok(response);
                }
                Ok(response) => {
                    metrics::FETCH_ATTEMPTS
                        .with_label_values(&[route, "http_error"])
                        .inc();
                    let status = response.status;
                    match classify_status(status) {
                        StatusVerdict::Done => {
                            debug!(url = %url, status, "Non-retryable status");
                            return Ok(response);
                        }
                        StatusVerdict::Escalate => {
                            warn!(url = %url, attempt, route, status, "Forbidden, switching to proxies");
                            self.activate(&mut proxy_active);
                        }
                        StatusVerdict::Backoff { multiplier } => {
                            warn!(url = %url, attempt, route, status, "Retryable status");
                            self.activate(&mut proxy_active);
                            if attempt < self.policy.max_attempts {
                                tokio::time::sleep(self.policy.retry_delay * multiplier).await;
                            }
                        }
                    }
                    last_response = Some(response);
                }
                Err(e) => {
                    metrics::FETCH_ATTEMPTS
                        .with_label_values(&[route, "transport_error"])
                        .inc();
                    warn!(url = %url, attempt, route, error = %e, "Fetch attempt failed");
                    if e.is_connection_family() {
                        self.activate(&mut proxy_active);
                    } else {
                        return Err(FetchError::InvalidRequest(e.to_string()));
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        if let Some(response) = last_response {
            warn!(url = %url, status = response.status, "Attempts exhausted, returning last response");
            return Ok(response);
        }

        Err(FetchError::Unreachable {
            url,
            attempts: self.policy.max_attempts,
            last_error: last_error.unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    fn activate(&self, proxy_active: &mut bool) {
        if self.policy.use_proxies && !*proxy_active {
            *proxy_active = true;
            metrics::PROXY_ACTIVATIONS.inc();
            info!("Proxy usage activated for remaining attempts");
        }
    }

    async fn pick_proxy(&self) -> Option<ProxyEntry> {
        self.pool.ensure_loaded(self.transport.as_ref()).await;
        let proxy = self.pool.choose().await;
        if proxy.is_none() {
            debug!("Proxy pool empty, falling back to direct");
        }
        proxy
    }
}
