//! HTTP transport
//!
//! The client only needs one capability from the network: send a request
//! and get back status, headers and body. Anything implementing
//! [`HttpClient`] can be plugged in, which is how tests drive the protocol
//! without sockets.
//!
//! Cancellation is by drop: an in-flight `send` future that is dropped
//! must abandon the request.

mod reqwest_client;

pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
pub use reqwest_client::ReqwestTransport;

use async_trait::async_trait;
use url::Url;

/// Transport-level failures (connection refused, reset, TLS, ...)
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Get a header as a string, if present and valid
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response as seen by the protocol layer
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Get a header as a string, if present and valid
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Request/response capability consumed by the client
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and wait for the complete response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
