use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::StorageError;

/// A small synchronous key-value store shared by all app state.
///
/// Writes may fail with [`StorageError::QuotaExceeded`] when the medium is
/// full; [`HistoryStore`](crate::history::HistoryStore) reacts to that by
/// degrading what it stores.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store with an optional byte quota.
///
/// The quota covers the sum of every key and value length, the way browser
/// storage accounts for its fixed allowance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `bytes` would be exceeded.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    /// Bytes currently used by all keys and values.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let requested = others + key.len() + value.len();
            if requested > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.delete("a").unwrap();
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let err = store.set("other", "123456").unwrap_err();
        assert!(err.is_quota_exceeded());
        // Failed write leaves existing data alone.
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn test_quota_counts_replaced_value_once() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "123456789").unwrap();
        // Overwriting the same key frees the old value first.
        store.set("k", "987654321").unwrap();
        assert_eq!(store.used_bytes(), 10);
    }
}
