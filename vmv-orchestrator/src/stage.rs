//! The stage orchestrator: drives one Turn-1 or Turn-2 invocation through
//! its full status sequence, writing artifacts under fresh keys only (never
//! overwriting a published one) and recording status history append-only.
//!
//! Generic over `L: LmmGateway` the way `SingleShotOperator<P: Provider>` is
//! generic over its provider — the gateway's `complete` method is RPITIT and
//! not object-safe, so it cannot be boxed. Object store and key-value
//! gateways stay behind `Arc<dyn Trait>` since those traits are object-safe
//! `#[async_trait]` traits, matching how `LocalOrch` holds
//! `Arc<dyn Operator>`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use vmv_core::{
    ArtifactReference, ConversationRecord, DurationMs, Error, Message, StatusHistoryEntry, TurnArtifact,
    Verification, VerificationId, VerificationStatus, VerificationType,
};
use vmv_keyvalue::{ConversationTable, VerificationTable};
use vmv_lmm::{LmmGateway, LmmRequest, ThinkingConfig};
use vmv_objectstore::{KeyLayout, ObjectStore, ObjectStoreExt};
use vmv_prompt::{PromptBuilder, PromptContext, VerificationSummary};

use crate::output::{Discrepancy, StageOutput, StageSummary};
use crate::response_parser::parse_response;
use crate::telemetry::CorrelationIdGenerator;
use crate::{context_loader, event::NormalizedEvent};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Compute today's `YYYY/MM/DD` date partition, used when an inbound event
/// doesn't carry its own. Only `"UTC"` is honored precisely — the dependency
/// stack doesn't carry a timezone database (`chrono-tz`), so any other zone
/// falls back to UTC with a warning rather than silently misdating artifacts.
fn today_date_partition(timezone: &str) -> String {
    if !timezone.eq_ignore_ascii_case("utc") {
        warn!(timezone, "date partition timezone is not UTC; falling back to UTC");
    }
    chrono::Utc::now().format("%Y/%m/%d").to_string()
}

/// Builds a `PromptContext` from loaded layout metadata and historical
/// context: dimensions and row labels come from `from_layout_metadata`
/// (defaulted only where the metadata is silent), any leftover metadata
/// fields are merged in as extras, and a historical-context summary
/// replaces the all-zero default when history was loaded.
fn build_prompt_context(layout_metadata: Option<&Value>, historical_context: Option<&Value>) -> PromptContext {
    let mut context = PromptContext::from_layout_metadata(layout_metadata);
    if let Some(Value::Object(map)) = layout_metadata {
        for (key, value) in map {
            if !matches!(key.as_str(), "rowCount" | "columnCount" | "rowLabels") {
                context = context.with_extra(key.clone(), value.clone());
            }
        }
    }
    if let Some(history) = historical_context {
        context = context.with_summary(VerificationSummary::from_json(history));
    }
    context
}

/// Static LMM call parameters, resolved once from `AppConfig` at bootstrap.
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Logical object store bucket name, recorded on every artifact reference.
    pub state_bucket: String,
    /// Bedrock model id.
    pub model: String,
    /// Max output tokens per call.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling top_p.
    pub top_p: f64,
    /// Extended-thinking configuration.
    pub thinking: ThinkingConfig,
    /// Token budget a rendered prompt is checked against before the LMM
    /// call (`BUDGET_TOKENS`); a prompt over budget is logged, not rejected.
    pub budget_tokens: u32,
    /// IANA timezone name used to compute today's date partition when an
    /// inbound event doesn't supply one.
    pub date_partition_timezone: String,
}

/// Drives Turn-1 and Turn-2 stage invocations end to end.
pub struct StageOrchestrator<L: LmmGateway> {
    object_store: Arc<dyn ObjectStore>,
    verification_table: Arc<dyn VerificationTable>,
    conversation_table: Arc<dyn ConversationTable>,
    lmm: L,
    prompt_builder: Arc<PromptBuilder>,
    correlation_ids: Arc<CorrelationIdGenerator>,
    settings: StageSettings,
}

impl<L: LmmGateway> StageOrchestrator<L> {
    /// Build a stage orchestrator from its gateways and static settings.
    #[must_use]
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        verification_table: Arc<dyn VerificationTable>,
        conversation_table: Arc<dyn ConversationTable>,
        lmm: L,
        prompt_builder: Arc<PromptBuilder>,
        correlation_ids: Arc<CorrelationIdGenerator>,
        settings: StageSettings,
    ) -> Self {
        Self {
            object_store,
            verification_table,
            conversation_table,
            lmm,
            prompt_builder,
            correlation_ids,
            settings,
        }
    }

    async fn record_status(
        &self,
        verification_id: &VerificationId,
        date_partition: &str,
        status: VerificationStatus,
        duration_ms: Option<DurationMs>,
        error: Option<Error>,
    ) {
        let entry = StatusHistoryEntry {
            status,
            timestamp_ms: now_ms(),
            duration_ms,
            error: error.clone(),
        };

        if let Err(e) = self.verification_table.append_status(verification_id, entry.clone()).await {
            warn!(verification_id = %verification_id, error = %e, "failed to append status to key-value store");
        }

        // Best-effort mirror to the object store, to let a workflow resume
        // mid-stage from the last recorded status — failure here never fails
        // the stage.
        let keys = KeyLayout::new(date_partition, verification_id.clone());
        if let Ok(Some(mut verification)) = self.verification_table.get(verification_id).await {
            verification.transition(entry);
            if let Err(e) = self
                .object_store
                .store_json(&keys.status_history(), &verification.status_history)
                .await
            {
                warn!(verification_id = %verification_id, error = %e, "failed to mirror status history to object store");
            }
        }
    }

    /// Best-effort snapshot of the current verification row, mirrored to
    /// the fixed `workflow_state()` key (resumable state a workflow runner
    /// can poll) and a timestamp-qualified `snapshot()` key (point-in-time
    /// trace). Never fails the stage.
    async fn persist_workflow_snapshot(&self, verification_id: &VerificationId, date_partition: &str) {
        let keys = KeyLayout::new(date_partition, verification_id.clone());
        let verification = match self.verification_table.get(verification_id).await {
            Ok(Some(v)) => v,
            _ => return,
        };
        if let Err(e) = self.object_store.store_json(&keys.workflow_state(), &verification).await {
            warn!(verification_id = %verification_id, error = %e, "failed to persist workflow state");
        }
        if let Err(e) = self.object_store.store_json(&keys.snapshot(now_ms()), &verification).await {
            warn!(verification_id = %verification_id, error = %e, "failed to persist workflow state snapshot");
        }
    }

    fn template_name(verification_type: VerificationType, turn: u8) -> &'static str {
        match (verification_type, turn) {
            (VerificationType::LayoutVsChecking, 1) => "turn1_layout_vs_checking",
            (VerificationType::PreviousVsCurrent, 1) => "turn1_previous_vs_current",
            (VerificationType::LayoutVsChecking, 2) => "turn2_layout_vs_checking",
            (VerificationType::PreviousVsCurrent, 2) => "turn2_previous_vs_current",
            _ => "turn1_layout_vs_checking",
        }
    }

    /// Run the Turn-1 stage for a normalized event, returning the canonical
    /// output shape regardless of success or failure.
    #[instrument(skip(self, event), fields(verification_id = %event.verification_id))]
    pub async fn run_turn1(&self, event: NormalizedEvent) -> StageOutput {
        let correlation_id = self.correlation_ids.next("turn1").to_string();
        let start = Instant::now();
        let verification_id = event.verification_id.clone();
        let date_partition = event
            .date_partition
            .clone()
            .unwrap_or_else(|| today_date_partition(&self.settings.date_partition_timezone));

        let verification = Verification::new(
            verification_id.clone(),
            event.verification_type,
            date_partition.clone(),
        );
        if self.verification_table.get(&verification_id).await.ok().flatten().is_none() {
            if let Err(e) = self.verification_table.create(&verification).await {
                error!(verification_id = %verification_id, error = %e, "failed to create verification record");
                return self.terminal_output(
                    &verification_id,
                    start,
                    VerificationStatus::Turn1Error,
                    0,
                    e.with_correlation_id(correlation_id),
                );
            }
        }

        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1Started, None, None)
            .await;

        let context = match context_loader::load_turn1_context(
            self.object_store.clone(),
            &date_partition,
            &verification_id,
            event.layout_metadata_key.as_deref(),
            event.historical_context_key.as_deref(),
            event.system_prompt_key.as_deref(),
        )
        .await
        {
            Ok(ctx) => ctx,
            Err(e) => return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await,
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1ContextLoaded, None, None)
            .await;

        let prompt_context = build_prompt_context(context.layout_metadata.as_ref(), context.historical_context.as_ref());
        let template = Self::template_name(event.verification_type, 1);
        let rendered_prompt = match self.prompt_builder.render(template, &prompt_context) {
            Ok(text) => text,
            Err(e) => {
                return self
                    .fail_turn1_with_status(
                        &verification_id,
                        &date_partition,
                        &correlation_id,
                        start,
                        e,
                        VerificationStatus::TemplateProcessingError,
                    )
                    .await
            }
        };
        if !PromptBuilder::fits_budget(&rendered_prompt, Some(self.settings.budget_tokens)) {
            warn!(
                verification_id = %verification_id,
                budget_tokens = self.settings.budget_tokens,
                "rendered turn1 prompt exceeds the configured token budget"
            );
        }

        let keys = KeyLayout::new(&date_partition, verification_id.clone());
        if let Err(e) = self
            .object_store
            .store_json(&keys.prompt(1), &serde_json::json!({"template": template, "prompt": rendered_prompt}))
            .await
        {
            return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1PromptPrepared, None, None)
            .await;
        self.persist_workflow_snapshot(&verification_id, &date_partition).await;

        let messages = vec![Message::user(build_message_content(&rendered_prompt, context.reference_image.as_ref()))];

        let request = LmmRequest {
            model: self.settings.model.clone(),
            messages,
            system: Some(context.system_prompt.clone()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            thinking: self.settings.thinking,
        };

        let bedrock_start = Instant::now();
        let lmm_result = self.lmm.complete(request.clone()).await;
        let bedrock_latency_ms = bedrock_start.elapsed().as_millis() as u64;

        let response = match lmm_result {
            Ok(response) => response,
            Err(e) => {
                return self
                    .fail_turn1_with_status(
                        &verification_id,
                        &date_partition,
                        &correlation_id,
                        start,
                        e,
                        VerificationStatus::BedrockProcessingFailed,
                    )
                    .await
            }
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1BedrockInvoked, None, None)
            .await;

        let parsed = match parse_response(&response) {
            Ok(p) => p,
            Err(e) => return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await,
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1ResponseParsed, None, None)
            .await;

        let attempt_ms = now_ms();
        let processed_key = keys.processed_response_attempt(1, attempt_ms);
        let raw_key = keys.raw_response_attempt(1, attempt_ms);
        let conversation_key = keys.conversation_attempt(1, attempt_ms);

        if let Err(e) = self
            .object_store
            .store_raw(&processed_key, parsed.processed_markdown.clone().into_bytes(), "text/markdown; charset=utf-8")
            .await
        {
            return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        if let Err(e) = self.object_store.store_json(&raw_key, &response_to_json(&response)).await {
            return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await;
        }

        let reasoning_blocks = tag_reasoning_blocks(&parsed.reasoning, 1);
        let conversation = ConversationRecord {
            verification_id: verification_id.clone(),
            turn_number: 1,
            messages: vec![Message::assistant(vec![vmv_core::ContentBlock::text(parsed.processed_markdown.clone())])],
            system_prompt: Some(context.system_prompt.clone()),
            assistant_reasoning_blocks: if reasoning_blocks.is_empty() { None } else { Some(reasoning_blocks) },
            token_usage: parsed.token_usage,
            bedrock_latency_ms,
            model_id: response.model.clone(),
        };
        if let Err(e) = self.object_store.store_json(&conversation_key, &conversation).await {
            return self.fail_turn1(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        if let Err(e) = self.conversation_table.put(&conversation).await {
            warn!(verification_id = %verification_id, error = %e, "failed to persist conversation record to key-value store");
        }

        let artifacts = TurnArtifact {
            processed_response: Some(ArtifactReference::new(&self.settings.state_bucket, &processed_key, "text/markdown; charset=utf-8")),
            raw_response: Some(ArtifactReference::new(&self.settings.state_bucket, &raw_key, "application/json")),
            conversation: Some(ArtifactReference::new(&self.settings.state_bucket, &conversation_key, "application/json")),
        };
        let dynamodb_updated = match self.verification_table.replace_turn_artifacts(&verification_id, 1, artifacts.clone()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(verification_id = %verification_id, error = %e, "failed to persist turn artifacts to key-value store");
                false
            }
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1ArtifactsStored, None, None)
            .await;
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn1Completed, None, None)
            .await;

        info!(verification_id = %verification_id, "turn1 completed");

        let mut s3_references = BTreeMap::new();
        s3_references.insert("prompts_turn1_prompt".to_string(), ArtifactReference::new(&self.settings.state_bucket, keys.prompt(1), "application/json"));
        if let Some(reference) = &artifacts.processed_response {
            s3_references.insert("responses_turn1_processed".to_string(), reference.clone());
        }
        if let Some(reference) = &artifacts.raw_response {
            s3_references.insert("responses_turn1_raw".to_string(), reference.clone());
        }
        if let Some(reference) = &artifacts.conversation {
            s3_references.insert("responses_turn1_conversation".to_string(), reference.clone());
        }
        if context.initialization.is_some() {
            s3_references.insert(
                "processing_initialization".to_string(),
                ArtifactReference::new(&self.settings.state_bucket, keys.initialization(), "application/json"),
            );
        }

        StageOutput {
            verification_id,
            status: VerificationStatus::Turn1Completed,
            schema_version: event.schema_version,
            s3_references,
            summary: StageSummary {
                bedrock_latency_ms: Some(bedrock_latency_ms),
                token_usage: Some(parsed.token_usage),
                dynamodb_updated,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
            discrepancies: None,
            error: None,
        }
    }

    /// Run the Turn-2 stage for a normalized event. Requires Turn-1 to have
    /// already completed and published a processed-response reference,
    /// since Turn-2's context loader pulls that artifact back in for
    /// comparison; the key is always read from the verification row, never
    /// recomputed.
    #[instrument(skip(self, event), fields(verification_id = %event.verification_id))]
    pub async fn run_turn2(&self, event: NormalizedEvent) -> StageOutput {
        let correlation_id = self.correlation_ids.next("turn2").to_string();
        let start = Instant::now();
        let verification_id = event.verification_id.clone();
        let date_partition = event
            .date_partition
            .clone()
            .unwrap_or_else(|| today_date_partition(&self.settings.date_partition_timezone));

        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2Started, None, None)
            .await;

        let turn1_processed_response_key = match self.verification_table.get(&verification_id).await {
            Ok(Some(verification)) => match verification.turn1.processed_response {
                Some(reference) => reference.key,
                None => {
                    let e = Error::validation("turn 1 has not published a processed response for this verification")
                        .with_component("stage_orchestrator")
                        .with_operation("run_turn2");
                    return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
                }
            },
            Ok(None) => {
                let e = Error::not_found(format!("verification {verification_id} not found"))
                    .with_component("stage_orchestrator")
                    .with_operation("run_turn2");
                return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
            }
            Err(e) => return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await,
        };

        let context = match context_loader::load_turn2_context(
            self.object_store.clone(),
            &date_partition,
            &verification_id,
            event.verification_type,
            &turn1_processed_response_key,
            event.layout_metadata_key.as_deref(),
            event.historical_context_key.as_deref(),
            event.system_prompt_key.as_deref(),
        )
        .await
        {
            Ok(ctx) => ctx,
            Err(e) => return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await,
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2ContextLoaded, None, None)
            .await;

        let mut prompt_context = build_prompt_context(context.layout_metadata.as_ref(), context.historical_context.as_ref());
        if let Some(turn1_response) = &context.turn1_processed_response {
            prompt_context = prompt_context.with_extra("turn1_processed_response", turn1_response.clone());
        }
        let template = Self::template_name(event.verification_type, 2);
        let rendered_prompt = match self.prompt_builder.render(template, &prompt_context) {
            Ok(text) => text,
            Err(e) => {
                return self
                    .fail_turn2_with_status(
                        &verification_id,
                        &date_partition,
                        &correlation_id,
                        start,
                        e,
                        VerificationStatus::TemplateProcessingError,
                    )
                    .await
            }
        };
        if !PromptBuilder::fits_budget(&rendered_prompt, Some(self.settings.budget_tokens)) {
            warn!(
                verification_id = %verification_id,
                budget_tokens = self.settings.budget_tokens,
                "rendered turn2 prompt exceeds the configured token budget"
            );
        }

        let keys = KeyLayout::new(&date_partition, verification_id.clone());
        if let Err(e) = self
            .object_store
            .store_json(&keys.prompt(2), &serde_json::json!({"template": template, "prompt": rendered_prompt}))
            .await
        {
            return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2PromptPrepared, None, None)
            .await;
        self.persist_workflow_snapshot(&verification_id, &date_partition).await;

        let messages = vec![Message::user(build_message_content(&rendered_prompt, context.checking_image.as_ref()))];

        let request = LmmRequest {
            model: self.settings.model.clone(),
            messages,
            system: Some(context.system_prompt.clone()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            thinking: self.settings.thinking,
        };

        let bedrock_start = Instant::now();
        let lmm_result = self.lmm.complete(request.clone()).await;
        let bedrock_latency_ms = bedrock_start.elapsed().as_millis() as u64;

        let response = match lmm_result {
            Ok(response) => response,
            Err(e) => {
                return self
                    .fail_turn2_with_status(
                        &verification_id,
                        &date_partition,
                        &correlation_id,
                        start,
                        e,
                        VerificationStatus::BedrockProcessingFailed,
                    )
                    .await
            }
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2BedrockInvoked, None, None)
            .await;

        let parsed = match parse_response(&response) {
            Ok(p) => p,
            Err(e) => return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await,
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2ResponseParsed, None, None)
            .await;

        let discrepancies = parsed
            .structured_json
            .as_ref()
            .and_then(|json| json.get("discrepancies"))
            .and_then(|value| value.as_array())
            .map(|items| items.iter().filter_map(parse_discrepancy).collect::<Vec<_>>());

        let attempt_ms = now_ms();
        let processed_key = keys.processed_response_attempt(2, attempt_ms);
        let raw_key = keys.raw_response_attempt(2, attempt_ms);
        let conversation_key = keys.conversation_attempt(2, attempt_ms);

        if let Err(e) = self
            .object_store
            .store_raw(&processed_key, parsed.processed_markdown.clone().into_bytes(), "text/markdown; charset=utf-8")
            .await
        {
            return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        if let Err(e) = self.object_store.store_json(&raw_key, &response_to_json(&response)).await {
            return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
        }

        let reasoning_blocks = tag_reasoning_blocks(&parsed.reasoning, 2);
        let conversation = ConversationRecord {
            verification_id: verification_id.clone(),
            turn_number: 2,
            messages: vec![Message::assistant(vec![vmv_core::ContentBlock::text(parsed.processed_markdown.clone())])],
            system_prompt: Some(context.system_prompt.clone()),
            assistant_reasoning_blocks: if reasoning_blocks.is_empty() { None } else { Some(reasoning_blocks) },
            token_usage: parsed.token_usage,
            bedrock_latency_ms,
            model_id: response.model.clone(),
        };
        if let Err(e) = self.object_store.store_json(&conversation_key, &conversation).await {
            return self.fail_turn2(&verification_id, &date_partition, &correlation_id, start, e).await;
        }
        if let Err(e) = self.conversation_table.put(&conversation).await {
            warn!(verification_id = %verification_id, error = %e, "failed to persist conversation record to key-value store");
        }

        let artifacts = TurnArtifact {
            processed_response: Some(ArtifactReference::new(&self.settings.state_bucket, &processed_key, "text/markdown; charset=utf-8")),
            raw_response: Some(ArtifactReference::new(&self.settings.state_bucket, &raw_key, "application/json")),
            conversation: Some(ArtifactReference::new(&self.settings.state_bucket, &conversation_key, "application/json")),
        };
        let dynamodb_updated = match self.verification_table.replace_turn_artifacts(&verification_id, 2, artifacts.clone()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(verification_id = %verification_id, error = %e, "failed to persist turn artifacts to key-value store");
                false
            }
        };
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2ArtifactsStored, None, None)
            .await;
        self.record_status(&verification_id, &date_partition, VerificationStatus::Turn2Completed, None, None)
            .await;

        info!(verification_id = %verification_id, "turn2 completed");

        let mut s3_references = BTreeMap::new();
        s3_references.insert("prompts_turn2_prompt".to_string(), ArtifactReference::new(&self.settings.state_bucket, keys.prompt(2), "application/json"));
        if let Some(reference) = &artifacts.processed_response {
            s3_references.insert("responses_turn2_processed".to_string(), reference.clone());
        }
        if let Some(reference) = &artifacts.raw_response {
            s3_references.insert("responses_turn2_raw".to_string(), reference.clone());
        }
        if let Some(reference) = &artifacts.conversation {
            s3_references.insert("responses_turn2_conversation".to_string(), reference.clone());
        }

        StageOutput {
            verification_id,
            status: VerificationStatus::Turn2Completed,
            schema_version: event.schema_version,
            s3_references,
            summary: StageSummary {
                bedrock_latency_ms: Some(bedrock_latency_ms),
                token_usage: Some(parsed.token_usage),
                dynamodb_updated,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
            discrepancies,
            error: None,
        }
    }

    async fn fail_turn2(
        &self,
        verification_id: &VerificationId,
        date_partition: &str,
        correlation_id: &str,
        start: Instant,
        error: Error,
    ) -> StageOutput {
        self.fail_turn2_with_status(verification_id, date_partition, correlation_id, start, error, VerificationStatus::Turn2Error)
            .await
    }

    async fn fail_turn2_with_status(
        &self,
        verification_id: &VerificationId,
        date_partition: &str,
        correlation_id: &str,
        start: Instant,
        error: Error,
        status: VerificationStatus,
    ) -> StageOutput {
        let error = error.with_correlation_id(correlation_id.to_string());
        error!(verification_id = %verification_id, error = %error, status = ?status, "turn2 failed");
        self.record_status(verification_id, date_partition, status, None, Some(error.clone()))
            .await;
        self.terminal_output(verification_id, start, status, 0, error)
    }

    async fn fail_turn1(
        &self,
        verification_id: &VerificationId,
        date_partition: &str,
        correlation_id: &str,
        start: Instant,
        error: Error,
    ) -> StageOutput {
        self.fail_turn1_with_status(verification_id, date_partition, correlation_id, start, error, VerificationStatus::Turn1Error)
            .await
    }

    async fn fail_turn1_with_status(
        &self,
        verification_id: &VerificationId,
        date_partition: &str,
        correlation_id: &str,
        start: Instant,
        error: Error,
        status: VerificationStatus,
    ) -> StageOutput {
        let error = error.with_correlation_id(correlation_id.to_string());
        error!(verification_id = %verification_id, error = %error, status = ?status, "turn1 failed");
        self.record_status(verification_id, date_partition, status, None, Some(error.clone()))
            .await;
        self.terminal_output(verification_id, start, status, 0, error)
    }

    fn terminal_output(
        &self,
        verification_id: &VerificationId,
        start: Instant,
        status: VerificationStatus,
        _unused: u8,
        error: Error,
    ) -> StageOutput {
        StageOutput {
            verification_id: verification_id.clone(),
            status,
            schema_version: crate::output::SCHEMA_VERSION.to_string(),
            s3_references: BTreeMap::new(),
            summary: StageSummary {
                bedrock_latency_ms: None,
                token_usage: None,
                dynamodb_updated: false,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
            discrepancies: None,
            error: Some(error),
        }
    }
}

fn build_message_content(
    prompt_text: &str,
    image: Option<&(String, String)>,
) -> Vec<vmv_core::ContentBlock> {
    let mut blocks = vec![vmv_core::ContentBlock::text(prompt_text)];
    if let Some((data, media_type)) = image {
        blocks.push(vmv_core::ContentBlock::image_base64(data.clone(), media_type.clone()));
    }
    blocks
}

fn response_to_json(response: &vmv_lmm::LmmResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

fn tag_reasoning_blocks(blocks: &[vmv_core::ReasoningBlock], turn: u8) -> Vec<vmv_core::ReasoningBlock> {
    blocks
        .iter()
        .cloned()
        .map(|mut block| {
            block.stage = format!("turn{turn}");
            block
        })
        .collect()
}

fn parse_discrepancy(value: &Value) -> Option<Discrepancy> {
    let obj = value.as_object()?;
    Some(Discrepancy {
        row: obj.get("row")?.as_str()?.to_string(),
        column: obj.get("column")?.as_u64()? as u32,
        expected: obj.get("expected").and_then(Value::as_str).unwrap_or_default().to_string(),
        observed: obj.get("observed").and_then(Value::as_str).unwrap_or_default().to_string(),
        severity: obj.get("severity").and_then(Value::as_str).unwrap_or("unknown").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use vmv_core::{ContentBlock, TokenUsage, VerificationType};
    use vmv_keyvalue::InMemoryKeyValueStore;
    use vmv_lmm::{LmmResponse, StopReason};
    use vmv_objectstore::InMemoryObjectStore;

    use super::*;

    /// A gateway that always returns the same canned response, for driving
    /// the orchestrator without a network call.
    struct CannedGateway {
        response: LmmResponse,
    }

    impl LmmGateway for CannedGateway {
        async fn complete(&self, _request: LmmRequest) -> Result<LmmResponse, Error> {
            Ok(self.response.clone())
        }
    }

    fn canned_response(text: &str) -> LmmResponse {
        LmmResponse {
            content: vec![ContentBlock::text(text)],
            reasoning: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::new(120, 80, None),
            model: "anthropic.claude-3".to_string(),
        }
    }

    fn settings() -> StageSettings {
        StageSettings {
            state_bucket: "vmv-state".to_string(),
            model: "anthropic.claude-3".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            top_p: 1.0,
            thinking: ThinkingConfig::Disabled,
            budget_tokens: 16000,
            date_partition_timezone: "UTC".to_string(),
        }
    }

    /// Writes minimal `.hbs` templates for all four `(verification_type,
    /// turn)` combinations into a fresh temp directory and points a
    /// `PromptBuilder` at it, following the `builder_for_dir` pattern.
    fn builder_with_templates() -> (tempfile::TempDir, Arc<PromptBuilder>) {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "turn1_layout_vs_checking",
            "turn1_previous_vs_current",
            "turn2_layout_vs_checking",
            "turn2_previous_vs_current",
        ] {
            fs::write(dir.path().join(format!("{name}.hbs")), "verify row {{row_count}}").unwrap();
        }
        let builder = Arc::new(vmv_prompt::builder::builder_for_dir(dir.path()));
        (dir, builder)
    }

    async fn seed_system_prompt(store: &dyn ObjectStore, date_partition: &str, verification_id: &VerificationId) {
        let keys = KeyLayout::new(date_partition, verification_id.clone());
        store
            .store_json(&keys.system_prompt(), &serde_json::json!({"promptContent": {"systemMessage": "be precise"}}))
            .await
            .unwrap();
    }

    fn orchestrator_with_gateway(
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<InMemoryKeyValueStore>,
        prompt_builder: Arc<PromptBuilder>,
        gateway: CannedGateway,
    ) -> StageOrchestrator<CannedGateway> {
        StageOrchestrator::new(
            object_store,
            kv.clone(),
            kv,
            gateway,
            prompt_builder,
            Arc::new(CorrelationIdGenerator::new()),
            settings(),
        )
    }

    fn direct_event(verification_id: &str, date_partition: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            verification_id: VerificationId::new(verification_id),
            verification_type: VerificationType::LayoutVsChecking,
            layout_id: None,
            date_partition: date_partition.map(str::to_string),
            schema_version: "2.1.0".to_string(),
            layout_metadata_key: None,
            historical_context_key: None,
            system_prompt_key: None,
        }
    }

    #[tokio::test]
    async fn run_turn1_completes_and_persists_artifacts() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        seed_system_prompt(object_store.as_ref(), "2026/08/01", &VerificationId::new("vm-1")).await;
        let gateway = CannedGateway {
            response: canned_response("# layout\nlooks good"),
        };
        let orchestrator = orchestrator_with_gateway(object_store.clone(), kv.clone(), prompt_builder, gateway);

        let event = direct_event("vm-1", Some("2026/08/01"));
        let output = orchestrator.run_turn1(event).await;

        assert_eq!(output.status, VerificationStatus::Turn1Completed);
        assert!(output.error.is_none());
        assert!(output.s3_references.contains_key("responses_turn1_processed"));
        assert!(output.s3_references.contains_key("responses_turn1_raw"));
        assert!(output.s3_references.contains_key("responses_turn1_conversation"));
        assert!(output.s3_references.contains_key("prompts_turn1_prompt"));
        assert_eq!(output.summary.token_usage.unwrap().input_tokens, 120);
        assert!(output.summary.dynamodb_updated);

        let record = vmv_keyvalue::VerificationTable::get(&*kv, &VerificationId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Turn1Completed);
        assert!(record.status_history.len() >= 6);
        assert!(record.turn1.processed_response.is_some());

        let processed_key = &output.s3_references["responses_turn1_processed"].key;
        let processed = object_store.retrieve(processed_key).await.unwrap();
        assert!(processed.is_some());

        let prompt_key = &output.s3_references["prompts_turn1_prompt"].key;
        assert_eq!(prompt_key, "2026/08/01/vm-1/prompts/turn1-prompt.json");
    }

    #[tokio::test]
    async fn run_turn1_falls_back_to_todays_date_partition_when_event_omits_one() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        let today = chrono::Utc::now().format("%Y/%m/%d").to_string();
        seed_system_prompt(object_store.as_ref(), &today, &VerificationId::new("vm-2")).await;
        let gateway = CannedGateway {
            response: canned_response("no fence here"),
        };
        let orchestrator = orchestrator_with_gateway(object_store, kv.clone(), prompt_builder, gateway);

        let event = direct_event("vm-2", None);
        let output = orchestrator.run_turn1(event).await;
        assert_eq!(output.status, VerificationStatus::Turn1Completed);

        let record = vmv_keyvalue::VerificationTable::get(&*kv, &VerificationId::new("vm-2")).await.unwrap().unwrap();
        assert!(record.date_partition.len() == "YYYY/MM/DD".len());
    }

    #[tokio::test]
    async fn run_turn1_reports_bedrock_processing_failed_when_response_has_no_text() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        seed_system_prompt(object_store.as_ref(), "2026/08/01", &VerificationId::new("vm-3")).await;
        let gateway = CannedGateway {
            response: LmmResponse {
                content: vec![],
                reasoning: Vec::new(),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
                model: "anthropic.claude-3".to_string(),
            },
        };
        let orchestrator = orchestrator_with_gateway(object_store, kv.clone(), prompt_builder, gateway);

        let event = direct_event("vm-3", Some("2026/08/01"));
        let output = orchestrator.run_turn1(event).await;
        assert_eq!(output.status, VerificationStatus::Turn1Error);
        assert!(output.error.is_some());

        let record = vmv_keyvalue::VerificationTable::get(&*kv, &VerificationId::new("vm-3")).await.unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Turn1Error);
    }

    #[tokio::test]
    async fn run_turn1_fails_fast_when_system_prompt_is_missing() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        let gateway = CannedGateway {
            response: canned_response("# layout\nlooks good"),
        };
        let orchestrator = orchestrator_with_gateway(object_store, kv.clone(), prompt_builder, gateway);

        let event = direct_event("vm-missing-prompt", Some("2026/08/01"));
        let output = orchestrator.run_turn1(event).await;
        assert_eq!(output.status, VerificationStatus::Turn1Error);
        assert!(output.s3_references.is_empty());
    }

    #[tokio::test]
    async fn run_turn2_pulls_turn1_response_and_extracts_discrepancies() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        seed_system_prompt(object_store.as_ref(), "2026/08/01", &VerificationId::new("vm-4")).await;

        let turn1_gateway = CannedGateway {
            response: canned_response("# layout\nall rows stocked"),
        };
        let turn1 = orchestrator_with_gateway(object_store.clone(), kv.clone(), prompt_builder.clone(), turn1_gateway);
        let turn1_output = turn1.run_turn1(direct_event("vm-4", Some("2026/08/01"))).await;
        assert_eq!(turn1_output.status, VerificationStatus::Turn1Completed);

        let turn2_text = "# comparison\n```json\n\
            {\"discrepancies\": [{\"row\": \"A\", \"column\": 3, \"expected\": \"soda\", \"observed\": \"empty\", \"severity\": \"high\"}]}\n\
            ```";
        let turn2_gateway = CannedGateway {
            response: canned_response(turn2_text),
        };
        let turn2 = orchestrator_with_gateway(object_store, kv.clone(), prompt_builder, turn2_gateway);
        let turn2_output = turn2.run_turn2(direct_event("vm-4", Some("2026/08/01"))).await;

        assert_eq!(turn2_output.status, VerificationStatus::Turn2Completed);
        let discrepancies = turn2_output.discrepancies.unwrap();
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].row, "A");
        assert_eq!(discrepancies[0].column, 3);

        let record = vmv_keyvalue::VerificationTable::get(&*kv, &VerificationId::new("vm-4")).await.unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Turn2Completed);
        assert!(record.turn2.processed_response.is_some());
    }

    #[tokio::test]
    async fn run_turn2_fails_when_turn1_never_published_a_processed_response() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let (_dir, prompt_builder) = builder_with_templates();
        kv.create(&Verification::new(VerificationId::new("vm-5"), VerificationType::LayoutVsChecking, "2026/08/01"))
            .await
            .unwrap();
        let gateway = CannedGateway {
            response: canned_response("unused"),
        };
        let orchestrator = orchestrator_with_gateway(object_store, kv, prompt_builder, gateway);

        let output = orchestrator.run_turn2(direct_event("vm-5", Some("2026/08/01"))).await;
        assert_eq!(output.status, VerificationStatus::Turn2Error);
        assert!(output.error.is_some());
    }
}
