use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backoff::{BackoffExecutor, RetryConfig, RetryEvent};
use crate::error::{ClientError, Result};
use crate::transport::{ClientConfig, GenerationTransport, HttpTransport, TransportResponse};
use crate::types::{ApiMode, GenerationRecord, GenerationRequest};

const INVALID_RESPONSE: &str = "Invalid response format from server";

/// Issues generation calls and normalizes what comes back.
///
/// In [`ApiMode::Direct`] exactly one call is made. In
/// [`ApiMode::Resilient`] the call is wrapped in a [`BackoffExecutor`].
/// Both modes apply the same response validation.
///
/// # Example
/// ```no_run
/// use studio_client::{ApiMode, GenerationClient, GenerationRequest, MockBackend, MockBackendConfig};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> studio_client::Result<()> {
/// let client = GenerationClient::new(Arc::new(MockBackend::new(MockBackendConfig::default())));
/// let request = GenerationRequest::new("data:image/png;base64,iVBORw0KGgo=", "make it sunset", "lighting-effects");
/// let record = client
///     .submit(&request, ApiMode::Resilient, &CancellationToken::new(), |e| {
///         println!("retrying after attempt {}: {}", e.attempt, e.message);
///     })
///     .await?;
/// println!("generated {}", record.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn GenerationTransport>,
    executor: BackoffExecutor,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("retry", self.executor.config())
            .finish()
    }
}

impl GenerationClient {
    /// Create a client over any transport, with the default retry policy.
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self {
            transport,
            executor: BackoffExecutor::default(),
        }
    }

    /// Create a client over HTTP.
    pub fn http(config: ClientConfig) -> Self {
        Self::new(Arc::new(HttpTransport::new(config)))
    }

    /// Override the retry policy used in resilient mode.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.executor = BackoffExecutor::new(config);
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.executor.config()
    }

    /// Submit a generation and return the validated record.
    ///
    /// `on_retry` is only called in resilient mode, once per scheduled retry.
    pub async fn submit<N>(
        &self,
        request: &GenerationRequest,
        mode: ApiMode,
        cancel: &CancellationToken,
        on_retry: N,
    ) -> Result<GenerationRecord>
    where
        N: FnMut(&RetryEvent),
    {
        if !request.is_complete() {
            return Err(ClientError::Validation("Missing fields".into()));
        }

        match mode {
            ApiMode::Direct => {
                if cancel.is_cancelled() {
                    return Err(ClientError::Cancelled);
                }
                self.call_once(mode, request, cancel).await
            }
            ApiMode::Resilient => {
                self.executor
                    .execute(
                        move || self.call_once(mode, request, cancel),
                        cancel,
                        on_retry,
                    )
                    .await
            }
        }
    }

    async fn call_once(
        &self,
        mode: ApiMode,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationRecord> {
        let response = self.transport.send(mode, request, cancel).await?;
        normalize_response(&response)
    }
}

/// Turn a raw response into a record, or into the error it describes.
pub fn normalize_response(response: &TransportResponse) -> Result<GenerationRecord> {
    if !response.is_success() {
        return Err(ClientError::Http {
            status: response.status,
            message: error_message(response),
        });
    }

    let json: Value = serde_json::from_str(&response.body)
        .map_err(|_| ClientError::Validation(INVALID_RESPONSE.into()))?;
    parse_record(&json).ok_or_else(|| ClientError::Validation(INVALID_RESPONSE.into()))
}

/// The server's `message` field if it sent one, otherwise a synthesized one.
fn error_message(response: &TransportResponse) -> String {
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| format!("Request failed with status {}", response.status))
}

fn required(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_record(json: &Value) -> Option<GenerationRecord> {
    if !json.is_object() {
        return None;
    }

    let source_image = match json.get("originalImageUrl") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return None,
    };

    Some(GenerationRecord {
        id: required(json, "id")?,
        result_image: required(json, "imageUrl")?,
        source_image,
        prompt: required(json, "prompt")?,
        task: required(json, "task")?,
        created_at: required(json, "createdAt")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_body() -> Value {
        json!({
            "id": "gen-1",
            "imageUrl": "data:image/png;base64,AAAA",
            "originalImageUrl": "data:image/png;base64,BBBB",
            "prompt": "make it sunset",
            "task": "lighting-effects",
            "createdAt": "2024-05-01T12:00:00Z"
        })
    }

    #[test]
    fn test_normalize_success() {
        let record = normalize_response(&TransportResponse::json(200, &ok_body())).unwrap();
        assert_eq!(record.id, "gen-1");
        assert_eq!(record.result_image, "data:image/png;base64,AAAA");
        assert_eq!(record.source_image.as_deref(), Some("data:image/png;base64,BBBB"));
        assert_eq!(record.created_at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_missing_original_is_allowed() {
        let mut body = ok_body();
        body.as_object_mut().unwrap().remove("originalImageUrl");
        let record = normalize_response(&TransportResponse::json(200, &body)).unwrap();
        assert!(record.source_image.is_none());
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let mut body = ok_body();
        body.as_object_mut().unwrap().remove("createdAt");
        let err = normalize_response(&TransportResponse::json(200, &body)).unwrap_err();
        assert!(matches!(err, ClientError::Validation(ref m) if m == INVALID_RESPONSE));
    }

    #[test]
    fn test_wrong_type_is_validation_error() {
        let mut body = ok_body();
        body["id"] = json!(42);
        assert!(matches!(
            normalize_response(&TransportResponse::json(200, &body)),
            Err(ClientError::Validation(_))
        ));

        let mut body = ok_body();
        body["originalImageUrl"] = json!(["not", "a", "string"]);
        assert!(matches!(
            normalize_response(&TransportResponse::json(200, &body)),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_field_is_validation_error() {
        let mut body = ok_body();
        body["prompt"] = json!("");
        assert!(matches!(
            normalize_response(&TransportResponse::json(200, &body)),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_non_json_success_body() {
        let err = normalize_response(&TransportResponse::new(200, "<html>")).unwrap_err();
        assert_eq!(err.to_string(), INVALID_RESPONSE);
    }

    #[test]
    fn test_server_message_preferred() {
        let resp = TransportResponse::json(503, &json!({"message": "Model overloaded"}));
        let err = normalize_response(&resp).unwrap_err();
        assert_eq!(err.to_string(), "Model overloaded");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_transport());
    }

    #[test]
    fn test_synthesized_message() {
        let err = normalize_response(&TransportResponse::new(500, "")).unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 500");

        let err = normalize_response(&TransportResponse::json(502, &json!({"detail": "x"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status 502");
    }
}
