#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use studio_client::{
    ApiMode, GenerationClient, GenerationRecord, GenerationRequest, GenerationTransport,
    TransportResponse,
};
use studio_session::*;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const SOURCE_IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";
pub const RESULT_IMAGE: &str = "data:image/jpeg;base64,/9j/4AAQ";

/// Transport that replays a fixed list of responses, one per call.
///
/// Once the script runs out, the last response is repeated.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<TransportResponse>>,
    last: Mutex<Option<TransportResponse>>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<TransportResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn send(
        &self,
        _mode: ApiMode,
        _request: &GenerationRequest,
        _cancel: &CancellationToken,
    ) -> studio_client::Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(resp) = next {
            *last = Some(resp);
        }
        Ok(last.clone().expect("script must not be empty"))
    }
}

/// Transport that blocks every call until released, ignoring cancellation,
/// so a result can arrive after the caller gave up on it.
pub struct GatedTransport {
    response: TransportResponse,
    entered: Notify,
    gate: Notify,
    calls: AtomicU32,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl GatedTransport {
    pub fn new(response: TransportResponse) -> Self {
        Self {
            response,
            entered: Notify::new(),
            gate: Notify::new(),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// The request of the most recent call.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }

    /// Wait until a call is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await
    }

    /// Let one blocked call finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationTransport for GatedTransport {
    async fn send(
        &self,
        _mode: ApiMode,
        request: &GenerationRequest,
        _cancel: &CancellationToken,
    ) -> studio_client::Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(self.response.clone())
    }
}

/// Codec that "compresses" by cutting the payload down to the budget.
pub struct TruncatingCodec;

#[async_trait]
impl ImageCodec for TruncatingCodec {
    async fn compress_to_max_bytes(
        &self,
        data_url: &str,
        max_bytes: usize,
    ) -> std::result::Result<String, CodecError> {
        if estimate_data_url_bytes(data_url) <= max_bytes {
            return Ok(data_url.to_string());
        }
        Ok(format!(
            "data:image/jpeg;base64,{}",
            "A".repeat(max_bytes / 3 * 4)
        ))
    }
}

/// Codec that cannot shrink anything.
pub struct StubbornCodec;

#[async_trait]
impl ImageCodec for StubbornCodec {
    async fn compress_to_max_bytes(
        &self,
        data_url: &str,
        max_bytes: usize,
    ) -> std::result::Result<String, CodecError> {
        if estimate_data_url_bytes(data_url) <= max_bytes {
            Ok(data_url.to_string())
        } else {
            Err(CodecError::TooLarge { max_bytes })
        }
    }
}

/// Codec that holds every call until released, then returns the input.
pub struct GatedCodec {
    entered: Notify,
    gate: CancellationToken,
}

impl GatedCodec {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: CancellationToken::new(),
        }
    }

    /// Wait until a call is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await
    }

    /// Let every current and future call through.
    pub fn release(&self) {
        self.gate.cancel();
    }
}

#[async_trait]
impl ImageCodec for GatedCodec {
    async fn compress_to_max_bytes(
        &self,
        data_url: &str,
        _max_bytes: usize,
    ) -> std::result::Result<String, CodecError> {
        self.entered.notify_one();
        self.gate.cancelled().await;
        Ok(data_url.to_string())
    }
}

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StudioEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<StudioEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&StudioEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: StudioEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A data URL whose payload decodes to `bytes` bytes (rounded down to 3).
pub fn image_of(bytes: usize) -> String {
    format!("data:image/png;base64,{}", "A".repeat(bytes / 3 * 4))
}

/// PNG bytes of a `width` x `height` gradient.
pub fn png_of(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

pub fn record(id: &str, image: &str) -> GenerationRecord {
    GenerationRecord {
        id: id.to_string(),
        result_image: image.to_string(),
        source_image: None,
        prompt: "add a hat".to_string(),
        task: "custom".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

pub fn success(id: &str) -> TransportResponse {
    TransportResponse::json(
        200,
        &json!({
            "id": id,
            "imageUrl": RESULT_IMAGE,
            "originalImageUrl": SOURCE_IMAGE,
            "prompt": "make it sunset",
            "task": "lighting-effects",
            "createdAt": "2026-05-01T12:00:00Z"
        }),
    )
}

pub fn overloaded() -> TransportResponse {
    TransportResponse::json(503, &json!({ "message": "Model overloaded" }))
}

/// Controller over `transport` and `storage`, with its events recorded.
pub fn controller(
    transport: Arc<dyn GenerationTransport>,
    storage: Arc<dyn KeyValueStore>,
) -> (Arc<GenerationController>, Arc<RecordingSink>) {
    controller_with_codec(transport, storage, Arc::new(JpegCodec::default()))
}

/// Like [`controller`], with history images going through `codec`.
pub fn controller_with_codec(
    transport: Arc<dyn GenerationTransport>,
    storage: Arc<dyn KeyValueStore>,
    codec: Arc<dyn ImageCodec>,
) -> (Arc<GenerationController>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let history = HistoryStore::new(storage.clone(), codec, HistoryConfig::default());
    let prefs = PrefsStore::new(storage, STUDIO_STORAGE_KEY);
    let controller = GenerationController::new(
        GenerationClient::new(transport),
        history,
        prefs,
        sink.clone(),
    );
    (Arc::new(controller), sink)
}

/// Controller with an image and prompt already set.
pub fn ready_controller(
    transport: Arc<dyn GenerationTransport>,
    mode: ApiMode,
) -> (Arc<GenerationController>, Arc<RecordingSink>) {
    let (controller, sink) = controller(transport, Arc::new(MemoryStore::new()));
    controller.set_image(Some(SOURCE_IMAGE.to_string()));
    controller.set_prompt("make it sunset");
    controller.set_task(Some("lighting-effects".to_string()));
    controller.set_mode(mode);
    (controller, sink)
}
