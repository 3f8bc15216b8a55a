//! S3-backed `ObjectStore`, the production gateway. Client construction
//! follows `aws-config`'s standard loader pattern used in the
//! `elevatelaw-prompt-scaler` and `DaRealYungBidness-decision-gate`
//! manifests (`aws_config::load_defaults` + a typed SDK client), generalized
//! from `neuron-provider-anthropic::Anthropic`'s builder shape.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, warn};
use vmv_core::Error;

use crate::ObjectStore;

/// Production `ObjectStore` backed by Amazon S3.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build from an already-constructed SDK client and target bucket.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build from the standard AWS config loader, for use at process
    /// bootstrap (`vmv-turn1::main`).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&config);
        Self::new(client, bucket)
    }

    fn classify(&self, operation: &str, key: &str, err: impl std::fmt::Display) -> Error {
        let message = err.to_string();
        let vendor_error = Error::from_vendor_code(&message, message.clone());
        if vendor_error.kind().vendor_code().is_some() {
            vendor_error
        } else {
            Error::network(message)
        }
        .with_component("object_store")
        .with_operation(operation)
        .with_detail("key", key)
        .with_detail("bucket", &self.bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn store_raw(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error> {
        debug!(bucket = %self.bucket, key, "storing object");
        let existing = self.retrieve(key).await?;
        if existing.is_some() {
            return Err(Error::validation(format!(
                "object already exists at key {key}; write-new-then-publish forbids overwrite"
            ))
            .with_component("object_store")
            .with_operation("store_raw"));
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| self.classify("store_raw", key, e))?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| self.classify("retrieve", key, e))?
                    .into_bytes()
                    .to_vec();
                Ok(Some(bytes))
            }
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    Ok(None)
                } else {
                    warn!(bucket = %self.bucket, key, error = %err, "object store retrieve failed");
                    Err(self.classify("retrieve", key, err))
                }
            }
        }
    }
}
