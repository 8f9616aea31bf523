use std::path::PathBuf;
use std::sync::Arc;

use studio_client::{ClientConfig, RetryConfig};

use crate::error::StorageError;
use crate::history::HistoryConfig;
use crate::prefs::STUDIO_STORAGE_KEY;
use crate::storage::{KeyValueStore, MemoryStore};

/// Default storage allowance, matching a browser origin's local storage.
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

/// Configuration for a studio session.
///
/// Use [`StudioConfig::builder()`] for ergonomic construction, or
/// [`StudioConfig::default()`] for an in-memory store with a 5 MiB quota.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// History key, capacity and image ceilings.
    pub history: HistoryConfig,

    /// Key holding the editor preferences.
    pub prefs_key: String,

    /// Path to SQLite database file. `None` = in-memory store.
    pub db_path: Option<PathBuf>,

    /// Byte quota for the store (`None` = unbounded).
    pub storage_quota: Option<usize>,

    /// Where the generation backend lives.
    pub client: ClientConfig,

    /// Retry policy for resilient mode.
    pub retry: RetryConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            prefs_key: STUDIO_STORAGE_KEY.to_string(),
            db_path: None,
            storage_quota: Some(DEFAULT_STORAGE_QUOTA),
            client: ClientConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl StudioConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> StudioConfigBuilder {
        StudioConfigBuilder::default()
    }

    /// Open the configured key-value store.
    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        if let Some(path) = &self.db_path {
            #[cfg(feature = "sqlite")]
            {
                let mut store = crate::db::SqliteStore::open(path)?;
                if let Some(quota) = self.storage_quota {
                    store = store.with_quota(quota);
                }
                tracing::debug!(path = %path.display(), "Opened SQLite studio store");
                return Ok(Arc::new(store));
            }
            #[cfg(not(feature = "sqlite"))]
            tracing::warn!(
                path = %path.display(),
                "Built without the `sqlite` feature, falling back to in-memory storage"
            );
        }

        Ok(match self.storage_quota {
            Some(quota) => Arc::new(MemoryStore::with_quota(quota)),
            None => Arc::new(MemoryStore::new()),
        })
    }
}

/// Builder for [`StudioConfig`].
#[derive(Default)]
pub struct StudioConfigBuilder {
    config: StudioConfig,
}

impl StudioConfigBuilder {
    /// Set the SQLite database path for persistence. Omit for in-memory.
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Set the store's byte quota, or `None` for no limit.
    pub fn with_storage_quota(mut self, quota: Option<usize>) -> Self {
        self.config.storage_quota = quota;
        self
    }

    /// Set the number of history records kept.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config.history = self.config.history.with_capacity(capacity);
        self
    }

    /// Set the regular and fallback per-image byte ceilings.
    pub fn with_image_ceilings(mut self, max_image_bytes: usize, fallback_image_bytes: usize) -> Self {
        self.config.history = self
            .config
            .history
            .with_image_ceilings(max_image_bytes, fallback_image_bytes);
        self
    }

    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.config.history = self.config.history.with_key(key);
        self
    }

    pub fn with_prefs_key(mut self, key: impl Into<String>) -> Self {
        self.config.prefs_key = key.into();
        self
    }

    /// Set the backend location and timeouts.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.config.client = client;
        self
    }

    /// Set the retry policy for resilient mode.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the final [`StudioConfig`].
    pub fn build(self) -> StudioConfig {
        self.config
    }
}
