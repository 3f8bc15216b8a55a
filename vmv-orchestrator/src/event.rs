//! Event normalizer: accepts either of the two inbound event shapes
//! the workflow runner can hand the stage binary and produces one
//! `NormalizedEvent` the rest of the orchestrator works with.
//!
//! "Direct" is a self-contained invocation payload: the verification id and
//! context are inline, plus optional pointers to context already staged in
//! the object store. "Referenced" carries nothing but a map of object
//! references — the normalizer resolves `processing_initialization` and
//! `images_metadata` itself to recover the same fields Direct supplies
//! inline, validating the union of required fields either way. Both shapes
//! carry a `schema_version`, stored through unchanged to the stage output.

use serde::Deserialize;
use serde_json::Value;

use vmv_core::{Error, LayoutId, VerificationId, VerificationType};
use vmv_objectstore::ObjectStore;

/// A pointer to a context artifact already staged in the object store.
#[derive(Debug, Clone, Deserialize)]
struct ObjectRef {
    key: String,
}

#[derive(Debug, Clone, Deserialize)]
struct VerificationContext {
    verification_type: String,
    #[serde(default)]
    layout_id: Option<String>,
    #[serde(default)]
    date_partition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DirectPayload {
    schema_version: String,
    verification_id: String,
    verification_context: VerificationContext,
    #[serde(default)]
    reference_image_ref: Option<ObjectRef>,
    #[serde(default)]
    historical_context_ref: Option<ObjectRef>,
    #[serde(default)]
    layout_metadata_ref: Option<ObjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferencedMap {
    processing_initialization: ObjectRef,
    images_metadata: ObjectRef,
    #[serde(rename = "processing_layout-metadata", default)]
    processing_layout_metadata: Option<ObjectRef>,
    #[serde(default)]
    processing_historical_context: Option<ObjectRef>,
    #[serde(default)]
    prompts_system: Option<ObjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferencedPayload {
    schema_version: String,
    references: ReferencedMap,
}

/// The initialization record a "Referenced" event's `processing_initialization`
/// pointer resolves to.
#[derive(Debug, Clone, Deserialize)]
struct InitializationRecord {
    verification_id: String,
    verification_type: String,
    #[serde(default)]
    layout_id: Option<String>,
    #[serde(default)]
    date_partition: Option<String>,
}

/// The normalized event every downstream component consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Which verification to run this stage for.
    pub verification_id: VerificationId,
    /// Which comparison to perform.
    pub verification_type: VerificationType,
    /// Which layout the verification refers to, if applicable.
    pub layout_id: Option<LayoutId>,
    /// Date partition to write artifacts under (`YYYY/MM/DD`), if the
    /// caller supplied one; otherwise the caller must derive one from the
    /// current date before constructing the stage orchestrator.
    pub date_partition: Option<String>,
    /// Schema version carried from the inbound event through to the stage
    /// output, unchanged.
    pub schema_version: String,
    /// Object key to load layout metadata from, if the event pointed at one
    /// instead of the fixed layout location.
    pub layout_metadata_key: Option<String>,
    /// Object key to load historical context from, if the event pointed at
    /// one instead of the fixed location.
    pub historical_context_key: Option<String>,
    /// Object key to load the system prompt from, if the event pointed at
    /// one instead of the fixed location.
    pub system_prompt_key: Option<String>,
}

fn parse_verification_type(value: &str) -> Result<VerificationType, Error> {
    match value {
        "LAYOUT_VS_CHECKING" => Ok(VerificationType::LayoutVsChecking),
        "PREVIOUS_VS_CURRENT" => Ok(VerificationType::PreviousVsCurrent),
        other => Err(Error::validation(format!("unknown verification_type: {other}"))
            .with_component("event_normalizer")
            .with_operation("normalize")),
    }
}

fn normalize_direct(payload: DirectPayload) -> Result<NormalizedEvent, Error> {
    if payload.verification_id.trim().is_empty() {
        return Err(Error::validation("verification_id must not be empty")
            .with_component("event_normalizer")
            .with_operation("normalize"));
    }
    // `reference_image_ref` is not carried through as a key override: the
    // reference image always lives at the fixed image key the object store
    // gateway writes it to during intake.
    let _ = payload.reference_image_ref;

    Ok(NormalizedEvent {
        verification_id: VerificationId::new(payload.verification_id),
        verification_type: parse_verification_type(&payload.verification_context.verification_type)?,
        layout_id: payload.verification_context.layout_id.map(LayoutId::new),
        date_partition: payload.verification_context.date_partition,
        schema_version: payload.schema_version,
        layout_metadata_key: payload.layout_metadata_ref.map(|r| r.key),
        historical_context_key: payload.historical_context_ref.map(|r| r.key),
        system_prompt_key: None,
    })
}

async fn normalize_referenced(
    store: &dyn ObjectStore,
    payload: ReferencedPayload,
) -> Result<NormalizedEvent, Error> {
    let init_bytes = store
        .retrieve(&payload.references.processing_initialization.key)
        .await?
        .ok_or_else(|| {
            Error::validation("processing_initialization reference did not resolve to an object")
                .with_component("event_normalizer")
                .with_operation("normalize")
        })?;
    let init: InitializationRecord = serde_json::from_slice(&init_bytes).map_err(|e| {
        Error::validation(format!("malformed processing_initialization record: {e}"))
            .with_component("event_normalizer")
            .with_operation("normalize")
    })?;

    if store.retrieve(&payload.references.images_metadata.key).await?.is_none() {
        return Err(Error::validation("images_metadata reference did not resolve to an object")
            .with_component("event_normalizer")
            .with_operation("normalize"));
    }

    if init.verification_id.trim().is_empty() {
        return Err(Error::validation("verification_id must not be empty")
            .with_component("event_normalizer")
            .with_operation("normalize"));
    }

    Ok(NormalizedEvent {
        verification_id: VerificationId::new(init.verification_id),
        verification_type: parse_verification_type(&init.verification_type)?,
        layout_id: init.layout_id.map(LayoutId::new),
        date_partition: init.date_partition,
        schema_version: payload.schema_version,
        layout_metadata_key: payload.references.processing_layout_metadata.map(|r| r.key),
        historical_context_key: payload.references.processing_historical_context.map(|r| r.key),
        system_prompt_key: payload.references.prompts_system.map(|r| r.key),
    })
}

/// Normalize a raw JSON event of either inbound shape into a `NormalizedEvent`.
///
/// Detects the shape from the payload's top-level keys: a `references` map
/// means "Referenced" (object pointers only, resolved against `store`); a
/// `verification_id` field means "Direct" (context inline, `store` unused).
pub async fn normalize(raw: &Value, store: &dyn ObjectStore) -> Result<NormalizedEvent, Error> {
    if raw.get("references").is_some() {
        let payload: ReferencedPayload = serde_json::from_value(raw.clone())
            .map_err(|e| Error::validation(format!("malformed referenced event payload: {e}")))?;
        normalize_referenced(store, payload).await
    } else if raw.get("verification_id").is_some() {
        let payload: DirectPayload = serde_json::from_value(raw.clone())
            .map_err(|e| Error::validation(format!("malformed direct event payload: {e}")))?;
        normalize_direct(payload)
    } else {
        Err(Error::validation("event payload matched neither the direct nor the referenced shape")
            .with_component("event_normalizer")
            .with_operation("normalize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use vmv_objectstore::{InMemoryObjectStore, ObjectStoreExt};

    #[tokio::test]
    async fn normalizes_direct_shape() {
        let raw = json!({
            "schema_version": "2.1.0",
            "verification_id": "vm-1",
            "verification_context": {
                "verification_type": "LAYOUT_VS_CHECKING",
                "layout_id": "layout-9",
                "date_partition": "2026/08/01",
            },
        });
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let event = normalize(&raw, store.as_ref()).await.unwrap();
        assert_eq!(event.verification_id.as_str(), "vm-1");
        assert_eq!(event.verification_type, VerificationType::LayoutVsChecking);
        assert_eq!(event.layout_id.unwrap().as_str(), "layout-9");
        assert_eq!(event.schema_version, "2.1.0");
    }

    #[tokio::test]
    async fn normalizes_referenced_shape_by_resolving_initialization() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        store
            .store_json(
                "2026/08/01/vm-2/initialization/initialization.json",
                &json!({
                    "verification_id": "vm-2",
                    "verification_type": "PREVIOUS_VS_CURRENT",
                }),
            )
            .await
            .unwrap();
        store
            .store_json("2026/08/01/vm-2/images/metadata.json", &json!({"width": 10}))
            .await
            .unwrap();

        let raw = json!({
            "schema_version": "2.1.0",
            "references": {
                "processing_initialization": {"key": "2026/08/01/vm-2/initialization/initialization.json"},
                "images_metadata": {"key": "2026/08/01/vm-2/images/metadata.json"},
            },
        });
        let event = normalize(&raw, store.as_ref()).await.unwrap();
        assert_eq!(event.verification_id.as_str(), "vm-2");
        assert_eq!(event.verification_type, VerificationType::PreviousVsCurrent);
        assert_eq!(event.schema_version, "2.1.0");
    }

    #[tokio::test]
    async fn referenced_shape_fails_when_initialization_reference_is_missing() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let raw = json!({
            "schema_version": "2.1.0",
            "references": {
                "processing_initialization": {"key": "nowhere"},
                "images_metadata": {"key": "nowhere-either"},
            },
        });
        assert!(normalize(&raw, store.as_ref()).await.is_err());
    }

    #[tokio::test]
    async fn rejects_empty_verification_id() {
        let raw = json!({
            "schema_version": "2.1.0",
            "verification_id": "",
            "verification_context": {"verification_type": "LAYOUT_VS_CHECKING"},
        });
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        assert!(normalize(&raw, store.as_ref()).await.is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_verification_type() {
        let raw = json!({
            "schema_version": "2.1.0",
            "verification_id": "vm-1",
            "verification_context": {"verification_type": "BOGUS"},
        });
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        assert!(normalize(&raw, store.as_ref()).await.is_err());
    }

    #[tokio::test]
    async fn rejects_payload_matching_neither_shape() {
        let raw = json!({"schema_version": "2.1.0"});
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        assert!(normalize(&raw, store.as_ref()).await.is_err());
    }
}
