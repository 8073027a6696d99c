//! Resilient HTTP fetching.
//!
//! Requests go out direct first. Connection-family failures, 403, 429 and 5xx
//! switch the rest of the call to randomly chosen proxies from a lazily loaded
//! pool. Every attempt has its own timeout.

mod client;
mod proxy;
mod transport;
mod types;

pub use client::{FetchPolicy, ResilientFetcher};
pub use proxy::{parse_proxy_list, ProxyEntry, ProxyPool, ProxyScheme, ProxySource};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{FetchError, FetchRequest, FetchResponse, HttpMethod, RequestBody, TransportError};
