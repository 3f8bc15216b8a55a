//! Request/response types for the LMM gateway, generalized from
//! `neuron-turn::types::{ProviderRequest, ProviderResponse}` down to the
//! fields the Bedrock Messages API actually uses here (no tools,
//! no tool_choice — this system never calls tools from the model).

use serde::{Deserialize, Serialize};

use vmv_core::{ContentBlock, Message, ReasoningBlock, TokenUsage};

/// Extended-thinking configuration, mirroring
/// `neuron-types::types::ThinkingConfig` but reduced to the on/off plus
/// budget shape this system's config exposes (`THINKING_TYPE`,
/// `BUDGET_TOKENS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    /// Extended thinking disabled.
    Disabled,
    /// Extended thinking enabled with the given token budget.
    Enabled {
        /// Token budget for the thinking block.
        budget_tokens: u32,
    },
}

/// A request to the LMM gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmmRequest {
    /// Bedrock model id.
    pub model: String,
    /// Conversation messages, in order.
    pub messages: Vec<Message>,
    /// System prompt, if any.
    pub system: Option<String>,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling top_p.
    pub top_p: f64,
    /// Extended-thinking configuration.
    pub thinking: ThinkingConfig,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a complete response.
    EndTurn,
    /// The model hit `max_tokens`.
    MaxTokens,
    /// The model's output was filtered.
    ContentFilter,
}

/// A response from the LMM gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmmResponse {
    /// Response content blocks (text, plus any reasoning blocks).
    pub content: Vec<ContentBlock>,
    /// Structured reasoning blocks, in order, if extended thinking was
    /// enabled. Empty rather than absent when thinking produced nothing.
    pub reasoning: Vec<ReasoningBlock>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// The model id that actually served the request.
    pub model: String,
}
