//! Context loader: hydrates everything a Turn-1 or Turn-2 prompt needs
//! — system prompt, reference/checking image, prior-turn history, layout
//! metadata, initialization record — as up to five independent fetches run
//! concurrently.
//!
//! Grounded in `neuron-orch-local::LocalOrch::dispatch_many`'s use of
//! `tokio::spawn` + join to fan out independent work; here the fetches are
//! plain futures joined with `tokio::join!` since they all run against
//! `Send + Sync` gateway references already behind `Arc`, so no extra task
//! boundary is needed.

use std::sync::Arc;

use serde_json::Value;
use vmv_core::{Error, VerificationId, VerificationType};
use vmv_objectstore::{KeyLayout, ObjectStore, ObjectStoreExt};

/// Everything a prompt render needs, hydrated from the object store.
#[derive(Debug, Clone, Default)]
pub struct LoadedContext {
    /// System prompt text, read from `promptContent.systemMessage` in the
    /// stored system-prompt artifact. Always present on a successful load —
    /// a missing or empty system message fails context loading outright.
    pub system_prompt: String,
    /// Base64 reference image data and its media type.
    pub reference_image: Option<(String, String)>,
    /// Base64 checking image data and its media type, for Turn-2.
    pub checking_image: Option<(String, String)>,
    /// Turn-1's processed response text, for Turn-2's comparison prompt.
    pub turn1_processed_response: Option<String>,
    /// Layout metadata (row/column counts, labels), if stored.
    pub layout_metadata: Option<Value>,
    /// Historical context (prior verification summary), if stored.
    pub historical_context: Option<Value>,
    /// The intake initialization record, if stored.
    pub initialization: Option<Value>,
}

const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

async fn load_text_image(store: &dyn ObjectStore, key: String) -> Result<Option<(String, String)>, Error> {
    let bytes = store.retrieve(&key).await?;
    Ok(bytes.map(|b| {
        let data = String::from_utf8_lossy(&b).into_owned();
        (data, DEFAULT_IMAGE_MEDIA_TYPE.to_string())
    }))
}

fn missing_system_message() -> Error {
    Error::validation("system prompt artifact is missing promptContent.systemMessage")
        .with_component("context_loader")
        .with_operation("load_system_prompt")
        .with_detail("code", "MissingSystemMessage")
}

async fn load_system_prompt(store: &dyn ObjectStore, key: &str) -> Result<String, Error> {
    let bytes = store.retrieve(key).await?.ok_or_else(missing_system_message)?;
    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        Error::validation(format!("malformed system prompt artifact: {e}"))
            .with_component("context_loader")
            .with_operation("load_system_prompt")
    })?;
    let message = document
        .get("promptContent")
        .and_then(|c| c.get("systemMessage"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(missing_system_message)?;
    Ok(message.to_string())
}

/// Loads context for a Turn-1 invocation: system prompt, reference image,
/// layout metadata, historical context, and the initialization record,
/// fetched concurrently. `layout_metadata_key`/`historical_context_key`/
/// `system_prompt_key` override the fixed layout when the inbound event
/// pointed at context staged elsewhere.
pub async fn load_turn1_context(
    store: Arc<dyn ObjectStore>,
    date_partition: &str,
    verification_id: &VerificationId,
    layout_metadata_key: Option<&str>,
    historical_context_key: Option<&str>,
    system_prompt_key: Option<&str>,
) -> Result<LoadedContext, Error> {
    let keys = KeyLayout::new(date_partition, verification_id.clone());
    let reference_key = keys.reference_image();
    let system_prompt_key = system_prompt_key.map(str::to_string).unwrap_or_else(|| keys.system_prompt());
    let layout_key = layout_metadata_key.map(str::to_string).unwrap_or_else(|| keys.layout_metadata());
    let historical_key = historical_context_key.map(str::to_string).unwrap_or_else(|| keys.historical_context());
    let initialization_key = keys.initialization();

    let (system_prompt, reference_image, layout_metadata, historical_context, initialization) = tokio::join!(
        load_system_prompt(store.as_ref(), &system_prompt_key),
        load_text_image(store.as_ref(), reference_key),
        store.retrieve_json::<Value>(&layout_key),
        store.retrieve_json::<Value>(&historical_key),
        store.retrieve_json::<Value>(&initialization_key),
    );

    Ok(LoadedContext {
        system_prompt: system_prompt?,
        reference_image: reference_image?,
        checking_image: None,
        turn1_processed_response: None,
        layout_metadata: layout_metadata?,
        historical_context: historical_context?,
        initialization: initialization?,
    })
}

/// Loads context for a Turn-2 invocation: system prompt, checking image,
/// Turn-1's processed response (resolved from `turn1_processed_response_key`,
/// the verification row's published reference — never recomputed), layout
/// metadata, and historical context, fetched concurrently.
pub async fn load_turn2_context(
    store: Arc<dyn ObjectStore>,
    date_partition: &str,
    verification_id: &VerificationId,
    _verification_type: VerificationType,
    turn1_processed_response_key: &str,
    layout_metadata_key: Option<&str>,
    historical_context_key: Option<&str>,
    system_prompt_key: Option<&str>,
) -> Result<LoadedContext, Error> {
    let keys = KeyLayout::new(date_partition, verification_id.clone());
    let checking_key = keys.checking_image();
    let system_prompt_key = system_prompt_key.map(str::to_string).unwrap_or_else(|| keys.system_prompt());
    let layout_key = layout_metadata_key.map(str::to_string).unwrap_or_else(|| keys.layout_metadata());
    let historical_key = historical_context_key.map(str::to_string).unwrap_or_else(|| keys.historical_context());

    let (system_prompt, checking_image, turn1_response, layout_metadata, historical_context) = tokio::join!(
        load_system_prompt(store.as_ref(), &system_prompt_key),
        load_text_image(store.as_ref(), checking_key),
        store.retrieve(turn1_processed_response_key),
        store.retrieve_json::<Value>(&layout_key),
        store.retrieve_json::<Value>(&historical_key),
    );

    Ok(LoadedContext {
        system_prompt: system_prompt?,
        reference_image: None,
        checking_image: checking_image?,
        turn1_processed_response: turn1_response?.map(|b| String::from_utf8_lossy(&b).into_owned()),
        layout_metadata: layout_metadata?,
        historical_context: historical_context?,
        initialization: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmv_objectstore::InMemoryObjectStore;

    fn system_prompt_artifact(message: &str) -> Vec<u8> {
        serde_json::json!({"promptContent": {"systemMessage": message}})
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn turn1_context_loads_available_artifacts_and_leaves_missing_ones_none() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let id = VerificationId::new("vm-1");
        store
            .store_raw(
                "2026/08/01/vm-1/prompts/system-prompt.json",
                system_prompt_artifact("be precise"),
                "application/json",
            )
            .await
            .unwrap();
        store
            .store_raw("2026/08/01/vm-1/images/reference.base64", b"ZmFrZQ==".to_vec(), "text/plain")
            .await
            .unwrap();

        let ctx = load_turn1_context(store, "2026/08/01", &id, None, None, None).await.unwrap();
        assert_eq!(ctx.system_prompt, "be precise");
        assert_eq!(ctx.reference_image.unwrap().0, "ZmFrZQ==");
        assert!(ctx.layout_metadata.is_none());
    }

    #[tokio::test]
    async fn turn1_context_fails_when_system_message_is_missing() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let id = VerificationId::new("vm-1");
        store
            .store_raw(
                "2026/08/01/vm-1/prompts/system-prompt.json",
                serde_json::json!({"promptContent": {}}).to_string().into_bytes(),
                "application/json",
            )
            .await
            .unwrap();

        let result = load_turn1_context(store, "2026/08/01", &id, None, None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn turn1_context_fails_when_system_prompt_artifact_is_absent() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let id = VerificationId::new("vm-1");
        let result = load_turn1_context(store, "2026/08/01", &id, None, None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn turn1_context_honors_layout_metadata_key_override() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let id = VerificationId::new("vm-1");
        store
            .store_raw(
                "2026/08/01/vm-1/prompts/system-prompt.json",
                system_prompt_artifact("be precise"),
                "application/json",
            )
            .await
            .unwrap();
        store
            .store_json("elsewhere/layout.json", &serde_json::json!({"rowCount": 4}))
            .await
            .unwrap();

        let ctx = load_turn1_context(store, "2026/08/01", &id, Some("elsewhere/layout.json"), None, None)
            .await
            .unwrap();
        assert_eq!(ctx.layout_metadata.unwrap()["rowCount"], 4);
    }

    #[tokio::test]
    async fn turn2_context_pulls_turn1_response_and_checking_image() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let id = VerificationId::new("vm-1");
        store
            .store_raw(
                "2026/08/01/vm-1/prompts/system-prompt.json",
                system_prompt_artifact("be precise"),
                "application/json",
            )
            .await
            .unwrap();
        store
            .store_raw(
                "2026/08/01/vm-1/response/turn1-processed-response-12345.md",
                b"# layout".to_vec(),
                "text/markdown",
            )
            .await
            .unwrap();
        store
            .store_raw("2026/08/01/vm-1/images/checking.base64", b"YWJj".to_vec(), "text/plain")
            .await
            .unwrap();

        let ctx = load_turn2_context(
            store,
            "2026/08/01",
            &id,
            VerificationType::LayoutVsChecking,
            "2026/08/01/vm-1/response/turn1-processed-response-12345.md",
            None,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(ctx.turn1_processed_response.as_deref(), Some("# layout"));
        assert_eq!(ctx.checking_image.unwrap().0, "YWJj");
    }
}
