//! Single-attempt HTTP transport.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::proxy::ProxyEntry;
use super::types::{FetchRequest, FetchResponse, HttpMethod, RequestBody, TransportError};

/// Performs exactly one HTTP attempt, optionally through a proxy.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEntry>,
        timeout: Duration,
    ) -> Result<FetchResponse, TransportError>;
}

/// reqwest-backed transport.
///
/// Direct attempts share one client (and its cookie jar). Proxied attempts get a
/// fresh client per attempt since reqwest binds proxies at build time.
pub struct ReqwestTransport {
    direct: Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let direct = Self::builder(user_agent)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            direct,
            user_agent: user_agent.to_string(),
        })
    }

    fn builder(user_agent: &str) -> reqwest::ClientBuilder {
        Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
    }

    fn client_for(&self, proxy: Option<&ProxyEntry>) -> Result<Client, TransportError> {
        match proxy {
            None => Ok(self.direct.clone()),
            Some(p) => {
                let proxy = reqwest::Proxy::all(p.url())
                    .map_err(|e| TransportError::Proxy(e.to_string()))?;
                Self::builder(&self.user_agent)
                    .proxy(proxy)
                    .build()
                    .map_err(|e| TransportError::Proxy(e.to_string()))
            }
        }
    }

    fn map_error(e: reqwest::Error, proxied: bool) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else if proxied && e.is_connect() {
            TransportError::Proxy(e.to_string())
        } else {
            let msg = e.to_string();
            let lower = msg.to_ascii_lowercase();
            if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
                TransportError::Tls(msg)
            } else {
                TransportError::Connect(msg)
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
        proxy: Option<&ProxyEntry>,
        timeout: Duration,
    ) -> Result<FetchResponse, TransportError> {
        let client = self.client_for(proxy)?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };
        builder = builder.timeout(timeout);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        match &request.body {
            Some(RequestBody::Form(fields)) => builder = builder.form(fields),
            Some(RequestBody::Json(value)) => builder = builder.json(value),
            None => {}
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, proxy.is_some()))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(e, proxy.is_some()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            url,
            headers,
            body,
        })
    }
}
