//! Request and response types for the fetcher.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// One logical request. Query params keep their order and may repeat keys.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            params: Vec::new(),
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Full URL with the query string, for logging.
    pub fn display_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, sep, query.join("&"))
    }
}

/// A response that reached us, whatever its status.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    /// Header names lower-cased
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure of a single attempt before any HTTP status was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("Proxy rejected the request: {0}")]
    Proxy(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Failures that suggest our own address is being blocked or the path is broken.
    pub fn is_connection_family(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// No attempt produced an HTTP response.
    #[error("{url} unreachable after {attempts} attempts: {last_error}")]
    Unreachable {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_url_encodes_repeated_params() {
        let req = FetchRequest::get("https://forum.example/feed.php")
            .with_param("search", "Hero's Guild")
            .with_param("noprefixes[]", "18")
            .with_param("noprefixes[]", "20");
        assert_eq!(
            req.display_url(),
            "https://forum.example/feed.php?search=Hero%27s%20Guild&noprefixes%5B%5D=18&noprefixes%5B%5D=20"
        );
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let resp = FetchResponse::new(200, "https://x/img", Vec::new())
            .with_header("Content-Type", "image/JPEG; charset=binary");
        assert_eq!(resp.content_type().as_deref(), Some("image/jpeg"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("image/JPEG; charset=binary"));
    }

    #[test]
    fn test_success_range() {
        assert!(FetchResponse::new(200, "u", Vec::new()).is_success());
        assert!(FetchResponse::new(304, "u", Vec::new()).is_success());
        assert!(!FetchResponse::new(404, "u", Vec::new()).is_success());
    }

    #[test]
    fn test_connection_family() {
        assert!(TransportError::Timeout.is_connection_family());
        assert!(TransportError::Tls("bad cert".into()).is_connection_family());
        assert!(!TransportError::InvalidRequest("bad url".into()).is_connection_family());
    }
}
