use std::sync::Arc;

use serde::{Deserialize, Serialize};
use studio_client::ApiMode;
use tracing::warn;

use crate::error::StorageError;
use crate::storage::KeyValueStore;

/// Storage key for the editor preferences.
pub const STUDIO_STORAGE_KEY: &str = "studio-prefs";

/// Editor inputs that survive a restart. Images are not kept here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioPrefs {
    pub prompt: String,
    pub task: Option<String>,
    pub api_mode: ApiMode,
}

pub struct PrefsStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for PrefsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefsStore").field("key", &self.key).finish()
    }
}

impl PrefsStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Stored preferences, or defaults when missing or unreadable.
    pub fn load(&self) -> StudioPrefs {
        match self.storage.get(&self.key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = %self.key, error = %e, "Stored preferences are corrupt, using defaults");
                StudioPrefs::default()
            }),
            Ok(None) => StudioPrefs::default(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read preferences");
                StudioPrefs::default()
            }
        }
    }

    pub fn save(&self, prefs: &StudioPrefs) -> Result<(), StorageError> {
        let json = serde_json::to_string(prefs)?;
        self.storage.set(&self.key, &json)
    }
}
