//! Artifact references: pointers into the object store's key layout that get
//! threaded through the verification record instead of raw bytes.

use serde::{Deserialize, Serialize};

/// A pointer to a stored object, never the object's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Bucket or logical container name.
    pub bucket: String,
    /// Full object key, per the object store's key layout.
    pub key: String,
    /// Content-Type the object was stored with.
    pub content_type: String,
    /// Size in bytes, if known at reference-creation time.
    pub size_bytes: Option<u64>,
}

impl ArtifactReference {
    /// Build a reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type: content_type.into(),
            size_bytes: None,
        }
    }

    /// Attach a known size.
    #[must_use]
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// One turn's stored artifacts: processed response, raw vendor response, and
/// conversation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnArtifact {
    /// `response/turn{n}-processed-response.md`
    pub processed_response: Option<ArtifactReference>,
    /// `responses/turn{n}-raw-response.json`
    pub raw_response: Option<ArtifactReference>,
    /// `responses/turn{n}-conversation.json`
    pub conversation: Option<ArtifactReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_size_is_additive_builder() {
        let r = ArtifactReference::new("bucket", "key", "application/json").with_size(42);
        assert_eq!(r.size_bytes, Some(42));
    }
}
