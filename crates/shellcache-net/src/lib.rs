//! # ShellCache Net
//!
//! Network boundary for the shellcache offline worker.
//!
//! ## Design Goals
//!
//! 1. **Typed requests/responses**: URL, method, headers, body bytes
//! 2. **Cache-bypass fetches**: force revalidation at the origin for
//!    install-time shell downloads
//! 3. **Injectable transport**: the worker depends on the [`Fetcher`] trait,
//!    not on a concrete client

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Cache interaction mode for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Use whatever intermediary HTTP caches allow.
    #[default]
    Default,
    /// Bypass intermediary HTTP caches and revalidate at the origin.
    Reload,
}

/// An outbound retrieval request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cache_mode: CacheMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            cache_mode: CacheMode::Default,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Bypass intermediary HTTP caches for this request.
    pub fn reload(mut self) -> Self {
        self.cache_mode = CacheMode::Reload;
        self
    }

    /// Whether this is a read-only retrieval request.
    pub fn is_retrieval(&self) -> bool {
        self.method == Method::GET
    }
}

/// An inbound response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Check if the request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

/// Transport abstraction the worker fetches through.
///
/// Transport failures are `Err`; HTTP error statuses are `Ok` responses
/// with `ok() == false`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "ShellCache/1.0".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        debug!(url = %request.url, method = %request.method, cache_mode = ?request.cache_mode, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if request.cache_mode == CacheMode::Reload {
            req_builder = req_builder
                .header("Cache-Control", "no-cache")
                .header("Pragma", "no-cache");
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/app.js").unwrap();
        let request = Request::get(url.clone()).header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("*/*"),
        );

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.cache_mode, CacheMode::Default);
        assert!(request.is_retrieval());
        assert!(request.headers.contains_key("accept"));
    }

    #[test]
    fn test_request_reload() {
        let url = Url::parse("https://example.com/app.js").unwrap();
        let request = Request::get(url).reload();
        assert_eq!(request.cache_mode, CacheMode::Reload);
    }

    #[tokio::test]
    async fn test_http_fetcher_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.js"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"shell".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/app.js", server.uri())).unwrap();
        let response = fetcher.fetch(Request::get(url)).await.unwrap();

        assert!(response.ok());
        assert_eq!(&response.body[..], b"shell");
    }

    #[tokio::test]
    async fn test_http_fetcher_error_status_is_not_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.js", server.uri())).unwrap();
        let response = fetcher.fetch(Request::get(url)).await.unwrap();

        assert!(!response.ok());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_fetcher_reload_sends_cache_bypass_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .and(header("Cache-Control", "no-cache"))
            .and(header("Pragma", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = fetcher.fetch(Request::get(url).reload()).await.unwrap();

        assert!(response.ok());
    }

    #[tokio::test]
    async fn test_http_fetcher_transport_failure() {
        // Nothing is listening on this port.
        let fetcher = HttpFetcher::new(FetcherConfig {
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        let result = fetcher.fetch(Request::get(url)).await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
