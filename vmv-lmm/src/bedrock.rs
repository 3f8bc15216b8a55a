//! Bedrock-backed `LmmGateway`, invoking an Anthropic model through
//! `aws-sdk-bedrockruntime`'s `invoke_model`. Request/response mapping
//! follows `neuron-provider-anthropic::client::Anthropic::complete`'s shape
//! (build body -> send -> map errors -> parse JSON -> convert response),
//! adapted from the Anthropic Messages HTTP API to Bedrock's
//! `InvokeModel` envelope.

use std::time::{Duration, Instant};

use aws_smithy_types::Blob;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, warn};
use vmv_core::{ContentBlock, Error, ImageSource, Message, ReasoningBlock, Role, TokenUsage};

use crate::request::{LmmRequest, LmmResponse, StopReason, ThinkingConfig};
use crate::validate::validate_request;
use crate::LmmGateway;

/// Production `LmmGateway` backed by Amazon Bedrock.
#[derive(Debug, Clone)]
pub struct BedrockLmmGateway {
    client: aws_sdk_bedrockruntime::Client,
    anthropic_version: String,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl BedrockLmmGateway {
    /// Build from an already-constructed SDK client.
    #[must_use]
    pub fn new(
        client: aws_sdk_bedrockruntime::Client,
        anthropic_version: impl Into<String>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            anthropic_version: anthropic_version.into(),
            connect_timeout,
            call_timeout,
        }
    }

    /// Build from the standard AWS config loader, for use at process
    /// bootstrap.
    pub async fn from_env(
        anthropic_version: impl Into<String>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_bedrockruntime::Client::new(&config);
        Self::new(client, anthropic_version, connect_timeout, call_timeout)
    }

    fn classify(&self, err: impl std::fmt::Display) -> Error {
        let message = err.to_string();
        let vendor_error = Error::from_vendor_code(&message, message.clone());
        if vendor_error.kind().vendor_code().is_some() {
            vendor_error
        } else {
            Error::network(message)
        }
        .with_component("lmm_gateway")
        .with_operation("complete")
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn content_block_to_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image {
            source: ImageSource::Base64 { data },
            media_type,
        } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
    }
}

fn message_to_json(message: &Message) -> Value {
    json!({
        "role": role_str(message.role),
        "content": message.content.iter().map(content_block_to_json).collect::<Vec<_>>(),
    })
}

fn build_body(request: &LmmRequest, anthropic_version: &str) -> Value {
    let mut body = json!({
        "anthropic_version": anthropic_version,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "messages": request.messages.iter().map(message_to_json).collect::<Vec<_>>(),
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    if let ThinkingConfig::Enabled { budget_tokens } = request.thinking {
        body["thinking"] = json!({"type": "enabled", "budget_tokens": budget_tokens});
    }
    body
}

fn parse_stop_reason(value: &str) -> StopReason {
    match value {
        "max_tokens" => StopReason::MaxTokens,
        "content_filter" | "refusal" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn parse_response(body: &Value, model: &str) -> Result<LmmResponse, Error> {
    let content_blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::response_parse("response missing content array"))?;

    let mut content = Vec::new();
    let mut reasoning = Vec::new();
    for block in content_blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    content.push(ContentBlock::text(text));
                }
            }
            Some("thinking") => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    reasoning.push(ReasoningBlock {
                        timestamp: now_ms(),
                        component: "lmm_gateway".to_string(),
                        stage: String::new(),
                        decision: None,
                        reasoning: text.to_string(),
                        confidence: None,
                    });
                }
            }
            _ => {}
        }
    }

    let reasoning_text_len: usize = reasoning.iter().map(|b| b.reasoning.len()).sum();
    let usage_value = body.get("usage");
    let input_tokens = usage_value.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64).unwrap_or(0);
    let output_tokens = usage_value.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64).unwrap_or(0);
    let reasoning_tokens = if reasoning.is_empty() {
        None
    } else {
        Some(
            usage_value
                .and_then(|u| u.get("thinking_tokens"))
                .and_then(Value::as_u64)
                .unwrap_or_else(|| (reasoning_text_len as u64) / 4),
        )
    };

    let stop_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(parse_stop_reason)
        .unwrap_or(StopReason::EndTurn);

    Ok(LmmResponse {
        content,
        reasoning,
        stop_reason,
        usage: TokenUsage::new(input_tokens, output_tokens, reasoning_tokens),
        model: body.get("model").and_then(Value::as_str).unwrap_or(model).to_string(),
    })
}

impl LmmGateway for BedrockLmmGateway {
    async fn complete(&self, request: LmmRequest) -> Result<LmmResponse, Error> {
        validate_request(&request)?;

        let body = build_body(&request, &self.anthropic_version);
        let payload = serde_json::to_vec(&body)
            .map_err(|e| Error::response_parse(format!("failed to serialize request body: {e}")))?;

        debug!(model = %request.model, "invoking bedrock model");
        let start = Instant::now();

        let call = self
            .client
            .invoke_model()
            .model_id(&request.model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload));

        let result = timeout(self.connect_timeout + self.call_timeout, call.send()).await;

        let elapsed = start.elapsed();
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(self.classify(err)),
            Err(_) => {
                warn!(elapsed_ms = elapsed.as_millis() as u64, "bedrock call timed out");
                return Err(Error::lmm_timeout(elapsed.as_millis() as u64)
                    .with_component("lmm_gateway")
                    .with_operation("complete"));
            }
        };

        let body: Value = serde_json::from_slice(output.body.as_ref())
            .map_err(|e| Error::response_parse(format!("failed to parse bedrock response body: {e}")))?;

        parse_response(&body, &request.model)
    }
}
