//! In-process stand-in for the generation route, used in local development
//! and to exercise the retry path.

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::transport::{GenerationTransport, TransportResponse};
use crate::types::{ApiMode, GenerationRequest};

/// Behaviour of a [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockBackendConfig {
    /// Lower bound of the simulated latency.
    pub min_latency: Duration,
    /// Upper bound of the simulated latency.
    pub max_latency: Duration,
    /// Probability in `[0, 1]` that a call answers 503.
    pub failure_rate: f64,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(1000),
            max_latency: Duration::from_millis(2000),
            failure_rate: 0.2,
        }
    }
}

impl MockBackendConfig {
    /// No latency and no failures.
    pub fn instant() -> Self {
        Self {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            failure_rate: 0.0,
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
}

/// Fake backend that echoes the submitted image back as the result.
///
/// Mirrors the development route: missing fields get a 400, every call
/// waits a random latency, and a share of calls fail with
/// `503 {"message": "Model overloaded"}`.
#[derive(Debug, Default)]
pub struct MockBackend {
    config: MockBackendConfig,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new(config: MockBackendConfig) -> Self {
        Self {
            config,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn sample_latency(&self) -> Duration {
        let min = self.config.min_latency.min(self.config.max_latency);
        let max = self.config.min_latency.max(self.config.max_latency);
        if min == max {
            return min;
        }
        let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }

    fn should_fail(&self) -> bool {
        // Fields are public, so the builder's clamp may have been bypassed.
        let rate = self.config.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && rand::rng().random_bool(rate)
    }
}

#[async_trait]
impl GenerationTransport for MockBackend {
    async fn send(
        &self,
        mode: ApiMode,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        if !request.is_complete() {
            return Ok(TransportResponse::json(
                400,
                &json!({ "message": "Missing fields" }),
            ));
        }

        let latency = self.sample_latency();
        tracing::debug!(call, %mode, latency_ms = latency.as_millis() as u64, "Mock backend call");

        if !latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        if self.should_fail() {
            return Ok(TransportResponse::json(
                503,
                &json!({ "message": "Model overloaded" }),
            ));
        }

        let body = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "imageUrl": request.image_data_url,
            "originalImageUrl": request.image_data_url,
            "prompt": request.prompt,
            "task": request.task,
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });
        Ok(TransportResponse::json(200, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("data:image/png;base64,AAAA", "make it sunset", "lighting-effects")
    }

    #[tokio::test]
    async fn test_instant_backend_echoes_image() {
        let backend = MockBackend::new(MockBackendConfig::instant());
        let resp = backend
            .send(ApiMode::Resilient, &request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.status, 200);

        let body: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(body["imageUrl"], "data:image/png;base64,AAAA");
        assert_eq!(body["originalImageUrl"], "data:image/png;base64,AAAA");
        assert_eq!(body["task"], "lighting-effects");
        assert!(!body["id"].as_str().unwrap().is_empty());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_is_bad_request() {
        let backend = MockBackend::new(MockBackendConfig::instant());
        let req = GenerationRequest::new("", "prompt", "custom");
        let resp = backend
            .send(ApiMode::Resilient, &req, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.status, 400);
        assert!(resp.body.contains("Missing fields"));
    }

    #[tokio::test]
    async fn test_always_failing_backend() {
        let backend = MockBackend::new(MockBackendConfig::instant().with_failure_rate(1.0));
        let resp = backend
            .send(ApiMode::Resilient, &request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.status, 503);
        assert!(resp.body.contains("Model overloaded"));
    }

    #[tokio::test]
    async fn test_out_of_range_failure_rate_is_clamped() {
        let always = MockBackend::new(MockBackendConfig {
            failure_rate: 1.5,
            ..MockBackendConfig::instant()
        });
        let never = MockBackend::new(MockBackendConfig {
            failure_rate: -1.0,
            ..MockBackendConfig::instant()
        });
        for _ in 0..20 {
            let resp = always
                .send(ApiMode::Direct, &request(), &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(resp.status, 503);

            let resp = never
                .send(ApiMode::Direct, &request(), &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(resp.status, 200);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_latency() {
        let backend = MockBackend::new(MockBackendConfig::default().with_failure_rate(0.0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = backend.send(ApiMode::Resilient, &request(), &cancel).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[test]
    fn test_latency_within_bounds() {
        let backend = MockBackend::new(MockBackendConfig::default());
        for _ in 0..50 {
            let latency = backend.sample_latency();
            assert!(latency >= Duration::from_millis(1000));
            assert!(latency <= Duration::from_millis(2000));
        }
    }
}
