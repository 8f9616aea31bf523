use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

pub const GENERATING_MESSAGE: &str = "Generating your image...";
pub const RETRYING_MESSAGE: &str = "Retrying generation...";
pub const SUCCESS_MESSAGE: &str = "Image generated successfully!";
pub const ERROR_MESSAGE: &str = "Failed to generate image";
pub const CANCELLED_MESSAGE: &str = "Generation cancelled";
pub const STORAGE_FAILED_MESSAGE: &str = "Failed to save result to history";

/// User-facing notifications raised by the
/// [`GenerationController`](crate::controller::GenerationController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StudioEvent {
    GenerationStarted,
    /// A retry was scheduled after `attempt` failed.
    Retrying { attempt: u32, message: String },
    #[serde(rename_all = "camelCase")]
    Succeeded { record_id: String },
    Failed { message: String },
    Cancelled,
    /// The result was saved, but older history lost quality or entries.
    StorageWarning { message: String },
    /// The result is shown but could not be saved to history.
    StorageFailed { message: String },
}

impl StudioEvent {
    /// Event name used when forwarding to a frontend.
    pub fn channel(&self) -> &'static str {
        match self {
            StudioEvent::GenerationStarted => "studio:generation_started",
            StudioEvent::Retrying { .. } => "studio:generation_retrying",
            StudioEvent::Succeeded { .. } => "studio:generation_succeeded",
            StudioEvent::Failed { .. } => "studio:generation_failed",
            StudioEvent::Cancelled => "studio:generation_cancelled",
            StudioEvent::StorageWarning { .. } => "studio:storage_warning",
            StudioEvent::StorageFailed { .. } => "studio:storage_failed",
        }
    }

    /// Text suitable for a toast.
    pub fn message(&self) -> String {
        match self {
            StudioEvent::GenerationStarted => GENERATING_MESSAGE.to_string(),
            StudioEvent::Retrying { attempt, message } if message.is_empty() => {
                format!("{} (Attempt {})", RETRYING_MESSAGE, attempt)
            }
            StudioEvent::Retrying { attempt, message } => {
                format!("{}. {} (Attempt {})", message, RETRYING_MESSAGE, attempt)
            }
            StudioEvent::Succeeded { .. } => SUCCESS_MESSAGE.to_string(),
            StudioEvent::Failed { message } if message.is_empty() => ERROR_MESSAGE.to_string(),
            StudioEvent::Failed { message } => message.clone(),
            StudioEvent::Cancelled => CANCELLED_MESSAGE.to_string(),
            StudioEvent::StorageWarning { message } | StudioEvent::StorageFailed { message } => {
                message.clone()
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StudioEvent::Failed { .. } | StudioEvent::StorageFailed { .. }
        )
    }
}

impl fmt::Display for StudioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Receives [`StudioEvent`]s. Called outside of any internal lock, so
/// implementations may query the controller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: StudioEvent);
}

impl<F> NotificationSink for F
where
    F: Fn(StudioEvent) + Send + Sync,
{
    fn notify(&self, event: StudioEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StudioEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StudioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: StudioEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: StudioEvent) {
        if event.is_error() {
            tracing::error!(channel = event.channel(), "{}", event);
        } else {
            tracing::info!(channel = event.channel(), "{}", event);
        }
    }
}

/// Emits events to the Tauri frontend on their [`StudioEvent::channel`].
#[cfg(feature = "tauri")]
pub struct TauriSink<R: tauri::Runtime = tauri::Wry> {
    app_handle: tauri::AppHandle<R>,
}

#[cfg(feature = "tauri")]
impl<R: tauri::Runtime> TauriSink<R> {
    pub fn new(app_handle: tauri::AppHandle<R>) -> Self {
        Self { app_handle }
    }
}

#[cfg(feature = "tauri")]
impl<R: tauri::Runtime> NotificationSink for TauriSink<R> {
    fn notify(&self, event: StudioEvent) {
        use tauri::Emitter;
        if let Err(e) = self.app_handle.emit(event.channel(), &event) {
            tracing::warn!(channel = event.channel(), error = %e, "Failed to emit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let retry = StudioEvent::Retrying {
            attempt: 2,
            message: "Model overloaded".into(),
        };
        assert_eq!(
            retry.message(),
            "Model overloaded. Retrying generation... (Attempt 2)"
        );
        assert_eq!(
            StudioEvent::Failed { message: String::new() }.to_string(),
            ERROR_MESSAGE
        );
        assert_eq!(StudioEvent::Cancelled.to_string(), CANCELLED_MESSAGE);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(StudioEvent::Succeeded {
            record_id: "gen-1".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "succeeded", "recordId": "gen-1"}));
        assert_eq!(StudioEvent::GenerationStarted.channel(), "studio:generation_started");
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(StudioEvent::GenerationStarted);
        sink.notify(StudioEvent::Cancelled);
        assert_eq!(rx.recv().await, Some(StudioEvent::GenerationStarted));
        assert_eq!(rx.recv().await, Some(StudioEvent::Cancelled));

        drop(rx);
        sink.notify(StudioEvent::Cancelled);
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |event: StudioEvent| seen.lock().unwrap().push(event);
        sink.notify(StudioEvent::GenerationStarted);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
