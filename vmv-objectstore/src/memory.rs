//! In-memory `ObjectStore`, grounded in `neuron-state-fs::FsStore` but
//! backed by a `HashMap` instead of the filesystem so orchestrator tests
//! never touch disk.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vmv_core::Error;

use crate::ObjectStore;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// A process-local, non-persistent `ObjectStore` for unit and integration
/// tests that exercise the full stage orchestrator without a real bucket.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored, for test assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store_raw(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error> {
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(key) {
            return Err(Error::validation(format!(
                "object already exists at key {key}; write-new-then-publish forbids overwrite"
            ))
            .with_component("object_store")
            .with_operation("store_raw"));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.objects.read().unwrap().get(key).map(|o| o.bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectStoreExt;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let store = InMemoryObjectStore::new();
        store.store_raw("k1", b"hello".to_vec(), "text/plain").await.unwrap();
        let back = store.retrieve("k1").await.unwrap().unwrap();
        assert_eq!(back, b"hello");
    }

    #[tokio::test]
    async fn overwrite_is_rejected() {
        let store = InMemoryObjectStore::new();
        store.store_raw("k1", b"a".to_vec(), "text/plain").await.unwrap();
        let result = store.store_raw("k1", b"b".to_vec(), "text/plain").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.retrieve("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_roundtrip_via_extension_trait() {
        let store = InMemoryObjectStore::new();
        store.store_json("k.json", &json!({"a": 1})).await.unwrap();
        let back: serde_json::Value = store.retrieve_json("k.json").await.unwrap().unwrap();
        assert_eq!(back["a"], 1);
    }
}
