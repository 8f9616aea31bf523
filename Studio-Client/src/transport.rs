use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::types::{ApiMode, GenerationRequest};

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Raw status and body of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response with a JSON body.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can carry a [`GenerationRequest`] to a backend.
///
/// Implementations should stop early and return [`ClientError::Cancelled`]
/// when `cancel` fires, if the underlying channel allows it.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn send(
        &self,
        mode: ApiMode,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse>;
}

/// Endpoint settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the app server, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Path used in [`ApiMode::Direct`].
    pub direct_path: String,
    /// Path used in [`ApiMode::Resilient`].
    pub resilient_path: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            direct_path: "/api/generate-gemini".to_string(),
            resilient_path: "/api/generate".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_direct_path(mut self, path: impl Into<String>) -> Self {
        self.direct_path = path.into();
        self
    }

    pub fn with_resilient_path(mut self, path: impl Into<String>) -> Self {
        self.resilient_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP transport posting JSON to the app server's generation routes.
///
/// # Example
/// ```no_run
/// use studio_client::{ClientConfig, HttpTransport};
///
/// let transport = HttpTransport::new(ClientConfig::default().with_base_url("http://localhost:3000/"));
/// assert_eq!(transport.base_url(), "http://localhost:3000");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
    direct_path: String,
    resilient_path: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize(config.base_url),
            direct_path: config.direct_path,
            resilient_path: config.resilient_path,
            timeout: config.timeout,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL used for the given mode.
    pub fn url_for(&self, mode: ApiMode) -> String {
        let path = match mode {
            ApiMode::Direct => &self.direct_path,
            ApiMode::Resilient => &self.resilient_path,
        };
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, url: &str, request: &GenerationRequest) -> Result<TransportResponse> {
        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Network {
                context: format!("Cannot reach generation endpoint {}", url),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ClientError::Network {
            context: "Failed to read generation response".into(),
            source: e,
        })?;

        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl GenerationTransport for HttpTransport {
    async fn send(
        &self,
        mode: ApiMode,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let url = self.url_for(mode);
        tracing::debug!(%url, %mode, task = %request.task, "Posting generation request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.post(&url, request) => result,
        }
    }
}
