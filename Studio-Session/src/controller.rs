use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use studio_client::{
    ApiMode, ClientError, GenerationClient, GenerationRecord, GenerationRequest,
    GenerationTransport, HttpTransport, RetryEvent, CUSTOM_TASK,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{JpegCodec, PreparedImage};
use crate::config::StudioConfig;
use crate::error::{CodecError, Result};
use crate::events::{NotificationSink, StudioEvent, STORAGE_FAILED_MESSAGE};
use crate::history::{HistoryStore, SaveOutcome};
use crate::prefs::{PrefsStore, StudioPrefs};

const DEGRADED_MESSAGE: &str = "Storage nearly full. Older history images were compressed.";
const RESET_MESSAGE: &str = "Storage full. Cleared old history to save new result.";

/// Lifecycle of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    #[default]
    Idle,
    Generating,
    Success,
    Error,
}

impl GenerationState {
    pub fn as_str(&self) -> &str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::Generating => "generating",
            GenerationState::Success => "success",
            GenerationState::Error => "error",
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one in-flight generation, with the inputs it was started from.
#[derive(Debug, Clone)]
pub struct RequestSession {
    id: u64,
    request: GenerationRequest,
    mode: ApiMode,
    cancel: CancellationToken,
    attempt: u32,
}

impl RequestSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    /// 1-based attempt currently running.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Observable state, cloned out for a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioSnapshot {
    pub image_data_url: Option<String>,
    pub prompt: String,
    pub task: Option<String>,
    pub generation_state: GenerationState,
    pub error: Option<String>,
    pub history: Vec<GenerationRecord>,
    pub api_mode: ApiMode,
    /// Attempt of the running generation, if any.
    pub attempt: Option<u32>,
}

#[derive(Debug, Default)]
struct StudioState {
    image: Option<String>,
    prompt: String,
    task: Option<String>,
    generation_state: GenerationState,
    error: Option<String>,
    history: Vec<GenerationRecord>,
    api_mode: ApiMode,
    session: Option<RequestSession>,
}

impl StudioState {
    fn is_current(&self, session_id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    fn prefs(&self) -> StudioPrefs {
        StudioPrefs {
            prompt: self.prompt.clone(),
            task: self.task.clone(),
            api_mode: self.api_mode,
        }
    }
}

/// Drives one generation at a time from the editor's current inputs.
///
/// States move `idle|success|error -> generating -> success|error`, and
/// back to `idle` on cancellation. All methods take `&self`; share the
/// controller behind an `Arc` to call [`abort`](Self::abort) while
/// [`start`](Self::start) is pending. The state lock is never held across
/// an `.await` and events are sent after it is released.
pub struct GenerationController {
    client: GenerationClient,
    history: HistoryStore,
    prefs: PrefsStore,
    sink: Arc<dyn NotificationSink>,
    uploader: JpegCodec,
    state: Arc<Mutex<StudioState>>,
    next_session: AtomicU64,
}

impl fmt::Debug for GenerationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationController")
            .field("client", &self.client)
            .field("history", &self.history)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl GenerationController {
    /// Build a controller, restoring preferences and history from storage.
    pub fn new(
        client: GenerationClient,
        history: HistoryStore,
        prefs: PrefsStore,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let saved = prefs.load();
        let state = StudioState {
            prompt: saved.prompt,
            task: saved.task,
            api_mode: saved.api_mode,
            history: history.load(),
            ..StudioState::default()
        };

        Self {
            client,
            history,
            prefs,
            sink,
            uploader: JpegCodec::default(),
            state: Arc::new(Mutex::new(state)),
            next_session: AtomicU64::new(0),
        }
    }

    /// Replace the codec used by [`upload_image`](Self::upload_image).
    pub fn with_upload_codec(mut self, codec: JpegCodec) -> Self {
        self.uploader = codec;
        self
    }

    /// Wire a controller from configuration over the given transport.
    pub fn from_config(
        config: &StudioConfig,
        transport: Arc<dyn GenerationTransport>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let storage = config.open_storage()?;
        let client = GenerationClient::new(transport).with_retry_config(config.retry.clone());
        let history = HistoryStore::new(
            storage.clone(),
            Arc::new(JpegCodec::default()),
            config.history.clone(),
        );
        let prefs = PrefsStore::new(storage, config.prefs_key.clone());
        Ok(Self::new(client, history, prefs, sink))
    }

    /// Wire a controller that talks HTTP to `config.client`.
    pub fn connect(config: &StudioConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.client.clone()));
        Self::from_config(config, transport, sink)
    }

    // ── Generation ──────────────────────────────────────────────────

    /// Run a generation from the current inputs and return the final state.
    ///
    /// Does nothing unless an image and a non-blank prompt are set and no
    /// generation is running.
    pub async fn start(&self) -> GenerationState {
        let Some((session_id, request, mode, cancel)) = self.begin() else {
            return self.generation_state();
        };

        self.sink.notify(StudioEvent::GenerationStarted);
        info!(session = session_id, %mode, task = %request.task, "Generation started");

        let result = self
            .client
            .submit(&request, mode, &cancel, |retry| self.on_retry(session_id, retry))
            .await;

        match result {
            Ok(record) => self.complete(session_id, record).await,
            Err(e) if e.is_cancelled() => self.cancelled(session_id),
            Err(e) => self.fail(session_id, e),
        }

        self.generation_state()
    }

    /// Cancel the running generation. Returns whether one was running.
    pub fn abort(&self) -> bool {
        let session = {
            let mut state = self.state.lock();
            if state.generation_state != GenerationState::Generating {
                return false;
            }
            state.generation_state = GenerationState::Idle;
            state.session.take()
        };

        if let Some(session) = &session {
            session.cancel.cancel();
            info!(session = session.id, "Generation aborted");
        }
        self.sink.notify(StudioEvent::Cancelled);
        true
    }

    fn begin(&self) -> Option<(u64, GenerationRequest, ApiMode, CancellationToken)> {
        let mut state = self.state.lock();
        if state.generation_state == GenerationState::Generating || state.session.is_some() {
            debug!("Generation already running, ignoring start");
            return None;
        }

        let image = match state.image.as_deref() {
            Some(image) if !image.is_empty() => image.to_string(),
            _ => {
                debug!("No image set, ignoring start");
                return None;
            }
        };
        let prompt = state.prompt.trim().to_string();
        if prompt.is_empty() {
            debug!("Prompt is blank, ignoring start");
            return None;
        }
        let task = state
            .task
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| CUSTOM_TASK.to_string());

        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let request = GenerationRequest::new(image, prompt, task);
        let cancel = CancellationToken::new();
        let mode = state.api_mode;

        state.session = Some(RequestSession {
            id,
            request: request.clone(),
            mode,
            cancel: cancel.clone(),
            attempt: 1,
        });
        state.generation_state = GenerationState::Generating;
        state.error = None;

        Some((id, request, mode, cancel))
    }

    fn on_retry(&self, session_id: u64, retry: &RetryEvent) {
        {
            let mut state = self.state.lock();
            match state.session.as_mut() {
                Some(session) if session.id == session_id => session.attempt = retry.attempt + 1,
                _ => return,
            }
        }
        self.sink.notify(StudioEvent::Retrying {
            attempt: retry.attempt,
            message: retry.message.clone(),
        });
    }

    async fn complete(&self, session_id: u64, record: GenerationRecord) {
        // The session ends here, before saving, so an abort can no longer
        // land between the result and its history entry.
        let finished = {
            let mut state = self.state.lock();
            let current = state.is_current(session_id);
            if current {
                state.session = None;
                state.generation_state = GenerationState::Success;
                state.image = Some(record.result_image.clone());
            }
            current
        };
        if !finished {
            debug!(session = session_id, "Ignoring result of abandoned generation");
            return;
        }
        info!(session = session_id, id = %record.id, "Generation succeeded");

        match self.history.save(record.clone()).await {
            Ok(SaveOutcome::Stored) => {}
            Ok(SaveOutcome::Skipped) => {
                warn!(id = %record.id, "Result was not saved to history");
            }
            Ok(SaveOutcome::Degraded) => self.sink.notify(StudioEvent::StorageWarning {
                message: DEGRADED_MESSAGE.to_string(),
            }),
            Ok(SaveOutcome::Reset) => self.sink.notify(StudioEvent::StorageWarning {
                message: RESET_MESSAGE.to_string(),
            }),
            Err(e) => {
                error!(id = %record.id, error = %e, "Failed to save result to history");
                self.sink.notify(StudioEvent::StorageFailed {
                    message: STORAGE_FAILED_MESSAGE.to_string(),
                });
            }
        }

        self.load_history();
        self.sink.notify(StudioEvent::Succeeded {
            record_id: record.id,
        });
    }

    fn cancelled(&self, session_id: u64) {
        let current = {
            let mut state = self.state.lock();
            let current = state.is_current(session_id);
            if current {
                state.session = None;
                state.generation_state = GenerationState::Idle;
                state.error = None;
            }
            current
        };

        if current {
            info!(session = session_id, "Generation cancelled");
            self.sink.notify(StudioEvent::Cancelled);
        }
    }

    fn fail(&self, session_id: u64, err: ClientError) {
        let message = err.to_string();
        let current = {
            let mut state = self.state.lock();
            let current = state.is_current(session_id);
            if current {
                state.session = None;
                state.generation_state = GenerationState::Error;
                state.error = Some(message.clone());
            }
            current
        };

        if current {
            warn!(session = session_id, error = %message, "Generation failed");
            self.sink.notify(StudioEvent::Failed { message });
        } else {
            debug!(session = session_id, "Ignoring failure of abandoned generation");
        }
    }

    // ── Editing ─────────────────────────────────────────────────────

    /// Load a past result back into the editor. Ignored while generating.
    pub fn restore(&self, record: &GenerationRecord) -> bool {
        let prefs = {
            let mut state = self.state.lock();
            if state.generation_state == GenerationState::Generating {
                return false;
            }
            state.image = Some(record.result_image.clone());
            state.prompt = record.prompt.clone();
            state.task = Some(record.task.clone());
            state.generation_state = GenerationState::Idle;
            state.error = None;
            state.prefs()
        };
        self.persist_prefs(&prefs);
        true
    }

    /// Clear the error text and leave the `error` state.
    pub fn clear_error(&self) {
        let mut state = self.state.lock();
        state.error = None;
        if state.generation_state == GenerationState::Error {
            state.generation_state = GenerationState::Idle;
        }
    }

    /// Prepare an uploaded PNG or JPEG and make it the working image.
    ///
    /// On error the current image is left as it was.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        mime: &str,
    ) -> std::result::Result<PreparedImage, CodecError> {
        let codec = self.uploader.clone();
        let mime = mime.to_string();
        let prepared = tokio::task::spawn_blocking(move || codec.prepare_upload(&bytes, &mime))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))?
            .inspect_err(|e| warn!(error = %e, "Rejected upload"))?;

        self.set_image(Some(prepared.data_url.clone()));
        Ok(prepared)
    }

    pub fn set_image(&self, image_data_url: Option<String>) {
        let mut state = self.state.lock();
        state.image = image_data_url.filter(|url| !url.is_empty());
        state.error = None;
    }

    pub fn clear_image(&self) {
        self.set_image(None);
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        let prefs = {
            let mut state = self.state.lock();
            state.prompt = prompt.into();
            state.error = None;
            state.prefs()
        };
        self.persist_prefs(&prefs);
    }

    pub fn set_task(&self, task: Option<String>) {
        let prefs = {
            let mut state = self.state.lock();
            state.task = task;
            state.prefs()
        };
        self.persist_prefs(&prefs);
    }

    /// Choose the backend path for the next generation.
    pub fn set_mode(&self, mode: ApiMode) {
        let prefs = {
            let mut state = self.state.lock();
            state.api_mode = mode;
            state.prefs()
        };
        self.persist_prefs(&prefs);
    }

    fn persist_prefs(&self, prefs: &StudioPrefs) {
        if let Err(e) = self.prefs.save(prefs) {
            warn!(error = %e, "Failed to save preferences");
        }
    }

    // ── History ─────────────────────────────────────────────────────

    /// Re-read history from storage.
    pub fn load_history(&self) -> Vec<GenerationRecord> {
        let history = self.history.load();
        self.state.lock().history = history.clone();
        history
    }

    pub fn clear_history(&self) {
        if let Err(e) = self.history.clear() {
            error!(error = %e, "Failed to clear history");
        }
        self.load_history();
    }

    /// Remove one record from history. Returns whether it was present.
    pub fn remove_history_item(&self, id: &str) -> bool {
        let removed = match self.history.remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                error!(id, error = %e, "Failed to remove history item");
                false
            }
        };
        self.load_history();
        removed
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn snapshot(&self) -> StudioSnapshot {
        let state = self.state.lock();
        StudioSnapshot {
            image_data_url: state.image.clone(),
            prompt: state.prompt.clone(),
            task: state.task.clone(),
            generation_state: state.generation_state,
            error: state.error.clone(),
            history: state.history.clone(),
            api_mode: state.api_mode,
            attempt: state.session.as_ref().map(|s| s.attempt),
        }
    }

    pub fn generation_state(&self) -> GenerationState {
        self.state.lock().generation_state
    }

    pub fn is_generating(&self) -> bool {
        self.generation_state() == GenerationState::Generating
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn image(&self) -> Option<String> {
        self.state.lock().image.clone()
    }

    pub fn prompt(&self) -> String {
        self.state.lock().prompt.clone()
    }

    pub fn task(&self) -> Option<String> {
        self.state.lock().task.clone()
    }

    pub fn api_mode(&self) -> ApiMode {
        self.state.lock().api_mode
    }

    pub fn history(&self) -> Vec<GenerationRecord> {
        self.state.lock().history.clone()
    }

    pub fn current_session(&self) -> Option<RequestSession> {
        self.state.lock().session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use studio_client::{MockBackend, MockBackendConfig};

    fn controller() -> GenerationController {
        let storage = Arc::new(MemoryStore::new());
        let client = GenerationClient::new(Arc::new(MockBackend::new(MockBackendConfig::instant())));
        let history = HistoryStore::new(
            storage.clone(),
            Arc::new(JpegCodec::default()),
            Default::default(),
        );
        let prefs = PrefsStore::new(storage, crate::prefs::STUDIO_STORAGE_KEY);
        GenerationController::new(client, history, prefs, Arc::new(|_: StudioEvent| {}))
    }

    #[test]
    fn test_initial_state() {
        let c = controller();
        let snapshot = c.snapshot();
        assert_eq!(snapshot.generation_state, GenerationState::Idle);
        assert_eq!(snapshot.api_mode, ApiMode::Direct);
        assert!(snapshot.history.is_empty());
        assert!(c.current_session().is_none());
    }

    #[tokio::test]
    async fn test_start_without_inputs_is_noop() {
        let c = controller();
        assert_eq!(c.start().await, GenerationState::Idle);

        c.set_image(Some("data:image/png;base64,AAAA".into()));
        c.set_prompt("   ");
        assert_eq!(c.start().await, GenerationState::Idle);
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let c = controller();
        c.set_image(Some("data:image/png;base64,AAAA".into()));
        c.set_prompt("  add a hat ");

        assert_eq!(c.start().await, GenerationState::Success);
        let history = c.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prompt, "add a hat");
        assert_eq!(history[0].task, CUSTOM_TASK);
        assert!(c.current_session().is_none());
    }

    #[test]
    fn test_abort_when_idle() {
        assert!(!controller().abort());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GenerationState::Generating).unwrap(),
            r#""generating""#
        );
        assert_eq!(GenerationState::Error.to_string(), "error");
    }
}
