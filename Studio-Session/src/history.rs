use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use studio_client::GenerationRecord;
use tracing::{debug, info, warn};

use crate::codec::{is_data_url, ImageCodec};
use crate::error::StorageError;
use crate::storage::KeyValueStore;

/// Storage key holding the JSON array of records, newest first.
pub const HISTORY_STORAGE_KEY: &str = "ai-studio-history-v1";
/// Most records kept.
pub const MAX_HISTORY_ITEMS: usize = 5;
/// Per-image ceiling applied to every save.
pub const MAX_STORAGE_IMAGE_BYTES: usize = 1024 * 1024;
/// Per-image ceiling applied when the store runs out of room.
pub const FALLBACK_IMAGE_BYTES: usize = 512 * 1024;

/// Where and how much history is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    pub key: String,
    pub capacity: usize,
    pub max_image_bytes: usize,
    pub fallback_image_bytes: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            key: HISTORY_STORAGE_KEY.to_string(),
            capacity: MAX_HISTORY_ITEMS,
            max_image_bytes: MAX_STORAGE_IMAGE_BYTES,
            fallback_image_bytes: FALLBACK_IMAGE_BYTES,
        }
    }
}

impl HistoryConfig {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Capacity is at least one record.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_image_ceilings(mut self, max_image_bytes: usize, fallback_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self.fallback_image_bytes = fallback_image_bytes.min(max_image_bytes);
        self
    }
}

/// How a [`HistoryStore::save`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was invalid and nothing was written.
    Skipped,
    /// Written on the first try.
    Stored,
    /// Written after every image was recompressed to the fallback ceiling.
    Degraded,
    /// Older history was discarded to make room for the new record.
    Reset,
}

impl SaveOutcome {
    /// True when stored history lost quality or entries.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SaveOutcome::Degraded | SaveOutcome::Reset)
    }
}

/// Bounded, most-recent-first list of finished generations.
///
/// The whole list lives under one key and is rewritten on every change.
/// When the store reports it is full, saving falls back to smaller images
/// and finally to keeping only the newest record.
pub struct HistoryStore {
    storage: Arc<dyn KeyValueStore>,
    codec: Arc<dyn ImageCodec>,
    config: HistoryConfig,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("config", &self.config)
            .finish()
    }
}

impl HistoryStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        codec: Arc<dyn ImageCodec>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            storage,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Read the stored history. Never fails: unreadable data reads as empty.
    pub fn load(&self) -> Vec<GenerationRecord> {
        let raw = match self.storage.get(&self.config.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "Failed to read history");
                return Vec::new();
            }
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!(key = %self.config.key, "Stored history is not a list, ignoring it");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "Stored history is corrupt, ignoring it");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<GenerationRecord>(item).ok())
            .filter(|record| record.is_valid() && seen.insert(record.id.clone()))
            .take(self.config.capacity)
            .collect()
    }

    /// Insert `record` at the front of the stored history.
    ///
    /// Fails only when even a history holding just `record` cannot be
    /// written, or on a storage error other than running out of room.
    pub async fn save(&self, record: GenerationRecord) -> Result<SaveOutcome, StorageError> {
        if !record.is_valid() {
            warn!(id = %record.id, "Invalid history record, skipping save");
            return Ok(SaveOutcome::Skipped);
        }

        let record = self
            .compress_record(record, self.config.max_image_bytes, false)
            .await;

        // Reload after compression so concurrent writers are not clobbered.
        let history = self.with_front(record.clone(), self.load());
        match self.write(&history) {
            Ok(()) => {
                debug!(id = %record.id, len = history.len(), "Saved history");
                return Ok(SaveOutcome::Stored);
            }
            Err(e) if e.is_quota_exceeded() => {
                warn!(error = %e, "History does not fit, recompressing images");
            }
            Err(e) => return Err(e),
        }

        let mut degraded = Vec::with_capacity(history.len());
        let mut dropped = HashSet::new();
        for item in history {
            let item = self
                .compress_record(item, self.config.fallback_image_bytes, true)
                .await;
            if item.is_valid() {
                degraded.push(item);
            } else {
                warn!(id = %item.id, "Dropping history record whose image could not be shrunk");
                dropped.insert(item.id);
            }
        }

        // Recompression awaited, so merge with what is stored now.
        let degraded = self.merge_degraded(&record.id, degraded, &dropped, self.load());
        if degraded.first().is_some_and(|first| first.id == record.id) {
            match self.write(&degraded) {
                Ok(()) => {
                    info!(id = %record.id, len = degraded.len(), "Saved history with recompressed images");
                    return Ok(SaveOutcome::Degraded);
                }
                Err(e) if e.is_quota_exceeded() => {
                    warn!(error = %e, "Recompressed history still does not fit");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(id = %record.id, "Storage full, clearing old history to save new result");
        self.clear()?;
        self.write(std::slice::from_ref(&record))?;
        Ok(SaveOutcome::Reset)
    }

    /// Delete all stored history.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.delete(&self.config.key)
    }

    /// Remove the record with `id`. Returns whether one was found.
    pub fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut history = self.load();
        let before = history.len();
        history.retain(|record| record.id != id);
        if history.len() == before {
            return Ok(false);
        }
        self.write(&history)?;
        Ok(true)
    }

    fn with_front(
        &self,
        record: GenerationRecord,
        mut history: Vec<GenerationRecord>,
    ) -> Vec<GenerationRecord> {
        history.retain(|existing| existing.id != record.id);
        history.insert(0, record);
        history.truncate(self.config.capacity);
        history
    }

    /// Lay recompressed copies over the stored history.
    ///
    /// The new record stays in front unless it was dropped. Stored records
    /// without a recompressed copy are kept as they are.
    fn merge_degraded(
        &self,
        new_id: &str,
        degraded: Vec<GenerationRecord>,
        dropped: &HashSet<String>,
        stored: Vec<GenerationRecord>,
    ) -> Vec<GenerationRecord> {
        let mut copies: HashMap<String, GenerationRecord> = degraded
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut merged = Vec::with_capacity(self.config.capacity);
        merged.extend(copies.remove(new_id));
        for item in stored {
            if item.id == new_id || dropped.contains(&item.id) {
                continue;
            }
            match copies.remove(&item.id) {
                Some(copy) => merged.push(copy),
                None => merged.push(item),
            }
        }
        merged.truncate(self.config.capacity);
        merged
    }

    fn write(&self, history: &[GenerationRecord]) -> Result<(), StorageError> {
        let json = serde_json::to_string(history)?;
        self.storage.set(&self.config.key, &json)
    }

    async fn compress_record(
        &self,
        mut record: GenerationRecord,
        max_bytes: usize,
        blank_on_failure: bool,
    ) -> GenerationRecord {
        let result_image = std::mem::take(&mut record.result_image);
        record.result_image = self
            .compress_image(result_image, max_bytes, blank_on_failure)
            .await;
        if let Some(source) = record.source_image.take() {
            record.source_image = Some(
                self.compress_image(source, max_bytes, blank_on_failure)
                    .await,
            );
        }
        record
    }

    async fn compress_image(&self, image: String, max_bytes: usize, blank_on_failure: bool) -> String {
        if !is_data_url(&image) {
            return image;
        }
        match self.codec.compress_to_max_bytes(&image, max_bytes).await {
            Ok(compressed) => compressed,
            Err(e) if blank_on_failure => {
                warn!(error = %e, max_bytes, "Could not shrink image, dropping it");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, max_bytes, "Could not shrink image, storing it as is");
                image
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct Passthrough;

    #[async_trait]
    impl ImageCodec for Passthrough {
        async fn compress_to_max_bytes(&self, data_url: &str, _: usize) -> Result<String, CodecError> {
            Ok(data_url.to_string())
        }
    }

    fn record(id: &str) -> GenerationRecord {
        GenerationRecord {
            id: id.to_string(),
            result_image: format!("https://cdn.example.com/{}.png", id),
            source_image: None,
            prompt: "add a hat".to_string(),
            task: "custom".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn store() -> (Arc<MemoryStore>, HistoryStore) {
        let storage = Arc::new(MemoryStore::new());
        let history = HistoryStore::new(storage.clone(), Arc::new(Passthrough), HistoryConfig::default());
        (storage, history)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (_, history) = store();
        assert_eq!(history.save(record("a")).await.unwrap(), SaveOutcome::Stored);
        assert_eq!(history.load(), vec![record("a")]);
    }

    #[tokio::test]
    async fn test_same_id_moves_to_front() {
        let (_, history) = store();
        for id in ["a", "b", "c"] {
            history.save(record(id)).await.unwrap();
        }
        history.save(record("a")).await.unwrap();

        let ids: Vec<_> = history.load().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_record_skipped() {
        let (storage, history) = store();
        let mut bad = record("a");
        bad.prompt.clear();
        assert_eq!(history.save(bad).await.unwrap(), SaveOutcome::Skipped);
        assert_eq!(storage.get(HISTORY_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_load_skips_invalid_entries() {
        let (storage, history) = store();
        let json = serde_json::json!([
            record("a"),
            {"id": "broken"},
            42,
            {"id": "b", "imageUrl": "", "prompt": "p", "task": "t", "createdAt": "now"},
            record("c"),
        ]);
        storage.set(HISTORY_STORAGE_KEY, &json.to_string()).unwrap();

        let ids: Vec<_> = history.load().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_load_corrupt_or_non_list() {
        let (storage, history) = store();
        storage.set(HISTORY_STORAGE_KEY, "{not json").unwrap();
        assert!(history.load().is_empty());
        storage.set(HISTORY_STORAGE_KEY, r#"{"id":"a"}"#).unwrap();
        assert!(history.load().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (_, history) = store();
        history.save(record("a")).await.unwrap();
        history.save(record("b")).await.unwrap();

        assert!(history.remove("a").unwrap());
        assert!(!history.remove("missing").unwrap());
        assert_eq!(history.load(), vec![record("b")]);

        history.clear().unwrap();
        assert!(history.load().is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = HistoryConfig::default()
            .with_capacity(0)
            .with_image_ceilings(100, 500);
        assert_eq!(config.capacity, 1);
        assert_eq!(config.fallback_image_bytes, 100);
        assert!(SaveOutcome::Reset.is_degraded());
        assert!(!SaveOutcome::Stored.is_degraded());
    }
}
