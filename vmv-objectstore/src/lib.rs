//! Object store gateway: durable, content-addressed artifact storage with
//! write-new-then-publish semantics — objects are never mutated in place,
//! only written under a new key and referenced.
//!
//! The trait shape follows `layer0::state::StateStore`: an `#[async_trait]`
//! object-safe trait so the orchestrator can hold a `Arc<dyn ObjectStore>`
//! and swap the S3 implementation for the in-memory one in tests, the same
//! way `neuron-state-fs::FsStore` and `neuron-state-memory` both implement
//! `StateStore`.

#![deny(missing_docs)]

pub mod key;
pub mod memory;
pub mod s3;

pub use key::KeyLayout;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use vmv_core::Error;

/// Gateway to durable object storage. Every write targets a brand-new key;
/// nothing in this trait supports in-place mutation, so a published artifact
/// can never be overwritten once its key exists.
///
/// Kept to two object-safe methods (mirroring `layer0::state::StateStore`'s
/// split from `StateReader`) so the orchestrator can hold a
/// `Arc<dyn ObjectStore>`; JSON convenience methods live on `ObjectStoreExt`
/// below, the same way `StateReader` is a blanket impl over `StateStore`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store raw bytes under `key` with the given content type. Fails if the
    /// key already exists (write-new-then-publish).
    async fn store_raw(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error>;

    /// Fetch raw bytes for `key`, or `Ok(None)` if it does not exist.
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;
}

/// JSON convenience methods layered over any `ObjectStore`. Generic methods
/// would make `ObjectStore` itself non-object-safe, so they live here
/// instead, blanket-implemented the way `layer0::state::StateReader` wraps
/// `StateStore`.
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    /// Serialize `value` as JSON and store it under `key`.
    async fn store_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| Error::response_parse(format!("failed to serialize {key}: {e}")))?;
        self.store_raw(key, bytes, "application/json").await
    }

    /// Fetch and deserialize JSON stored under `key`, or `Ok(None)` if absent.
    async fn retrieve_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.retrieve(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::response_parse(format!("failed to deserialize {key}: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl<T: ObjectStore + ?Sized> ObjectStoreExt for T {}
