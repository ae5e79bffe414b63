//! Requests, responses and the network boundary.
//!
//! Everything that leaves the device goes through [`Network`]. The
//! production implementation is [`HttpNetwork`] (reqwest, one pooled client);
//! [`MemoryNetwork`] serves canned responses and can be switched offline.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, NetworkError, Result};

/// What the request is for. Only `Document` changes behavior: navigations
/// fall back to the offline page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Audio,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, url: Url, destination: Destination) -> Self {
        Self {
            method,
            url,
            destination,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Other)
    }

    /// A top-level navigation.
    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Document)
    }

    pub fn parse(method: Method, url: &str, destination: Destination) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(method, url, destination))
    }

    /// Cache identity: method plus absolute URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The outside world, as seen by the caches.
pub trait Network: Send + Sync {
    fn fetch(&self, request: &Request) -> impl Future<Output = std::result::Result<Response, NetworkError>> + Send;
}

impl<N: Network> Network for Arc<N> {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetworkError> {
        (**self).fetch(request).await
    }
}

/// reqwest-backed network. The client is built once and reused so
/// connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetworkError> {
        let start = Instant::now();
        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!("[HttpNetwork] {} {} failed: {}", request.method, request.url, e);
                if e.is_connect() || e.is_timeout() {
                    NetworkError::Offline
                } else {
                    NetworkError::Request(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::Request(e.to_string()))?
            .to_vec();

        debug!(
            "[HttpNetwork] {} {} -> {} ({} bytes, {} ms)",
            request.method,
            request.url,
            status,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// Canned responses keyed by URL. Unknown URLs answer 404; when offline every
/// fetch fails with [`NetworkError::Offline`].
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, response: Response) {
        let mut routes = match self.routes.lock() {
            Ok(routes) => routes,
            Err(poisoned) => poisoned.into_inner(),
        };
        routes.insert(url.to_string(), response);
    }

    pub fn with(self, url: &str, response: Response) -> Self {
        self.insert(url, response);
        self
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Number of fetches attempted, including failed ones.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetworkError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }
        let routes = match self.routes.lock() {
            Ok(routes) => routes,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}
