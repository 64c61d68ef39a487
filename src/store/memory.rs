use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Document, DocumentStore, StoreError};

/// Process-local document store
///
/// Clones share the same document, so a second `PositionStore` built from a clone
/// observes what the first one wrote. Used for `--offline` runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    document: Arc<Mutex<Document>>,
    writes: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `document`
    #[must_use]
    pub fn with_document(document: Document) -> Self {
        Self {
            document: Arc::new(Mutex::new(document)),
            ..Self::default()
        }
    }

    /// Copy of the current document
    #[must_use]
    pub fn snapshot(&self) -> Document {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of acknowledged writes
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Simulates losing the connection: every call fails until reset
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is offline".to_owned()));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn fetch_root(&self) -> Result<Document, StoreError> {
        self.check_online()?;
        Ok(self.snapshot())
    }

    fn set_child(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.check_online()?;
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_document() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.set_child("4", &json!("Paprika")).unwrap();

        assert_eq!(other.fetch_root().unwrap()["4"], json!("Paprika"));
        assert_eq!(other.write_count(), 1);
    }

    #[test]
    fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(store.fetch_root().is_err());
        assert!(store.set_child("1", &json!("Salt")).is_err());
        assert_eq!(store.write_count(), 0);

        store.set_offline(false);
        assert!(store.set_child("1", &json!("Salt")).is_ok());
    }
}
