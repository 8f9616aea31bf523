//! # Studio Session
//!
//! Editor session state for an AI image studio: one generation at a time,
//! cancellable mid-flight, with a small persisted history of results.
//!
//! ## Features
//!
//! - Generation lifecycle (`idle`, `generating`, `success`, `error`) with abort
//! - Bounded, most-recent-first history under a single storage key
//! - Upload preparation: PNG/JPEG only, downscaled and re-encoded as JPEG
//! - Size-adaptive JPEG compression and a quota-driven degradation cascade
//! - SQLite persistence (`sqlite` feature, on by default) or in-memory storage
//! - Notifications through closures, channels, `tracing` or Tauri events
//!
//! ## Quick Start
//!
//! 1. Build a [`StudioConfig`] (or use the default)
//! 2. Create a [`GenerationController`] with [`GenerationController::from_config`]
//! 3. Set an image and a prompt, then call [`GenerationController::start`]
//! 4. Call [`GenerationController::abort`] from another task to cancel
//!
//! See the `examples/` directory for complete usage examples.

pub mod codec;
pub mod config;
pub mod controller;
#[cfg(feature = "sqlite")]
pub mod db;
pub mod error;
pub mod events;
pub mod history;
pub mod prefs;
pub mod storage;

pub use codec::{
    estimate_data_url_bytes, is_data_url, is_supported_upload, DataUrl, ImageCodec, JpegCodec,
    PreparedImage, DEFAULT_IMAGE_QUALITY, MAX_IMAGE_DIMENSION, MAX_UPLOAD_BYTES,
};
pub use config::{StudioConfig, StudioConfigBuilder, DEFAULT_STORAGE_QUOTA};
pub use controller::{GenerationController, GenerationState, RequestSession, StudioSnapshot};
#[cfg(feature = "sqlite")]
pub use db::SqliteStore;
pub use error::{CodecError, Result, StorageError, StudioError};
#[cfg(feature = "tauri")]
pub use events::TauriSink;
pub use events::{ChannelSink, NotificationSink, StudioEvent, TracingSink};
pub use history::{
    HistoryConfig, HistoryStore, SaveOutcome, FALLBACK_IMAGE_BYTES, HISTORY_STORAGE_KEY,
    MAX_HISTORY_ITEMS, MAX_STORAGE_IMAGE_BYTES,
};
pub use prefs::{PrefsStore, StudioPrefs, STUDIO_STORAGE_KEY};
pub use storage::{KeyValueStore, MemoryStore};

pub use studio_client;
