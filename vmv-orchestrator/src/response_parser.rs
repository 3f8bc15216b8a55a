//! Response parser: splits an `LmmResponse` into the Markdown summary
//! and the trailing ```json fenced block the prompt templates ask the model
//! to produce, and carries the reasoning text and token usage through
//! unchanged for the conversation record.

use serde_json::Value;
use tracing::warn;
use vmv_core::{Error, ReasoningBlock, TokenUsage};

use vmv_lmm::{LmmResponse, StopReason};

/// The model's response, split into its Markdown and structured parts.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    /// Full response text, Markdown and JSON fence included, as stored at
    /// `response/turn{n}-processed-response.md`.
    pub processed_markdown: String,
    /// The parsed contents of the trailing ```json fence, if present and
    /// well-formed.
    pub structured_json: Option<Value>,
    /// Structured reasoning blocks, in order, if the model used extended
    /// thinking.
    pub reasoning: Vec<ReasoningBlock>,
    /// Token usage reported for the call.
    pub token_usage: TokenUsage,
    /// Why the model stopped generating.
    pub stop_reason: StopReason,
}

fn extract_json_fence(text: &str) -> Option<&str> {
    let start_marker = "```json";
    let start = text.find(start_marker)? + start_marker.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Parse an `LmmResponse` into Markdown text plus an optional structured
/// JSON payload extracted from its trailing ```json fence.
pub fn parse_response(response: &LmmResponse) -> Result<ParsedResponse, Error> {
    let processed_markdown = response
        .content
        .iter()
        .filter_map(|block| block.as_text())
        .collect::<Vec<_>>()
        .join("\n");

    if processed_markdown.trim().is_empty() {
        return Err(Error::response_parse("model response contained no text content")
            .with_component("response_parser")
            .with_operation("parse_response"));
    }

    let structured_json = match extract_json_fence(&processed_markdown) {
        Some(fence) => Some(
            serde_json::from_str(fence)
                .map_err(|e| Error::response_parse(format!("malformed JSON in response fence: {e}")))?,
        ),
        None => None,
    };

    if !response.usage.is_consistent() {
        warn!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            reasoning_tokens = ?response.usage.reasoning_tokens,
            total_tokens = ?response.usage.total_tokens,
            computed_total = response.usage.computed_total(),
            "vendor-reported token total disagrees with computed total"
        );
    }

    Ok(ParsedResponse {
        processed_markdown,
        structured_json,
        reasoning: response.reasoning.clone(),
        token_usage: response.usage,
        stop_reason: response.stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmv_core::ContentBlock;

    fn response_with_text(text: &str) -> LmmResponse {
        LmmResponse {
            content: vec![ContentBlock::text(text)],
            reasoning: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::new(10, 20, None),
            model: "anthropic.claude-3".to_string(),
        }
    }

    #[test]
    fn extracts_json_fence_when_present() {
        let text = "Here is the layout.\n```json\n{\"rows\": []}\n```\n";
        let parsed = parse_response(&response_with_text(text)).unwrap();
        assert_eq!(parsed.structured_json.unwrap()["rows"], serde_json::json!([]));
    }

    #[test]
    fn no_fence_yields_none_structured_json() {
        let parsed = parse_response(&response_with_text("just prose, no fence")).unwrap();
        assert!(parsed.structured_json.is_none());
    }

    #[test]
    fn malformed_fence_json_is_an_error() {
        let text = "```json\n{not valid json\n```";
        assert!(parse_response(&response_with_text(text)).is_err());
    }

    #[test]
    fn empty_text_content_is_an_error() {
        let response = LmmResponse {
            content: vec![],
            reasoning: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "m".to_string(),
        };
        assert!(parse_response(&response).is_err());
    }
}
