use async_trait::async_trait;
use reqwest::header::{AsHeaderName, HeaderMap};
use reqwest::{Request, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::errors::{HubError, Result};

/// Completed HTTP exchange as seen by the classifier
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Header value, if present and visible ASCII
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// "Send a prepared request, get back a response"
///
/// Implementations report only transport-level failures as errors; any HTTP
/// status, including 4xx/5xx, is a successful exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<RawResponse>;
}

/// Default transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse> {
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = self.http_client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(%method, %path, status = status.as_u16(), "Notification hub responded");

        Ok(RawResponse::new(status, headers, body.to_vec()))
    }
}
