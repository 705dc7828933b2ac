//! I/O seams of the fetcher: HTTP transport and sleeping.
//!
//! Both are traits so the retry/pagination logic in [`crate::engine`] can be
//! driven by scripted responses and a recording clock in tests.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use url::Url;

use scholarsnap_shared::{FetchConfig, FetchErrorKind, Result, ScholarSnapError};

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// URL after redirects.
    pub final_url: Url,
    /// Response body decoded as text.
    pub body: String,
}

/// A request that produced no response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("body read failed: {0}")]
    Body(String),
}

/// Issues GET requests with one fixed client identity.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: &Url,
    ) -> impl Future<Output = std::result::Result<RawResponse, TransportError>> + Send;
}

/// Suspends the fetcher between requests and retries.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// reqwest-backed transport.
///
/// Headers are fixed at construction so every request in a run presents the
/// same browser identity.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build the HTTP client from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        let language = HeaderValue::from_str(&config.accept_language).map_err(|e| {
            ScholarSnapError::config(format!("invalid fetch.accept_language: {e}"))
        })?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                ScholarSnapError::config(format!("invalid fetch.proxy '{proxy}': {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            ScholarSnapError::fetch(
                FetchErrorKind::Network,
                format!("failed to build HTTP client: {e}"),
            )
        })?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(
        &self,
        url: &Url,
    ) -> impl Future<Output = std::result::Result<RawResponse, TransportError>> + Send {
        let request = self.client.get(url.as_str());
        async move {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.without_url().to_string())
                } else {
                    TransportError::Connect(e.without_url().to_string())
                }
            })?;

            let status = response.status().as_u16();
            let final_url = response.url().clone();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Body(e.without_url().to_string()))?;

            Ok(RawResponse {
                status,
                final_url,
                body,
            })
        }
    }
}
