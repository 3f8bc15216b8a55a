//! The verification aggregate and conversation record, persisted to the
//! key-value gateway and mirrored into the object store.

use serde::{Deserialize, Serialize};

use crate::artifact::TurnArtifact;
use crate::content::{Message, ReasoningBlock};
use crate::id::{LayoutId, VerificationId};
use crate::status::{StatusHistoryEntry, VerificationStatus, VerificationType};
use crate::token_usage::TokenUsage;

/// The verification record tracked in the key-value store's verification
/// table, one row per `VerificationId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Unique id for this verification.
    pub verification_id: VerificationId,
    /// Which kind of comparison this verification performs.
    pub verification_type: VerificationType,
    /// The layout being verified against, if applicable.
    pub layout_id: Option<LayoutId>,
    /// Current status.
    pub status: VerificationStatus,
    /// Append-only history of status transitions.
    pub status_history: Vec<StatusHistoryEntry>,
    /// Turn 1's stored artifacts.
    pub turn1: TurnArtifact,
    /// Turn 2's stored artifacts, once that stage has run.
    pub turn2: TurnArtifact,
    /// Date partition (`YYYY/MM/DD`) object keys were written under.
    pub date_partition: String,
}

impl Verification {
    /// Start a new verification record in the `VerificationRequested` state.
    #[must_use]
    pub fn new(
        verification_id: VerificationId,
        verification_type: VerificationType,
        date_partition: impl Into<String>,
    ) -> Self {
        Self {
            verification_id,
            verification_type,
            layout_id: None,
            status: VerificationStatus::VerificationRequested,
            status_history: Vec::new(),
            turn1: TurnArtifact::default(),
            turn2: TurnArtifact::default(),
            date_partition: date_partition.into(),
        }
    }

    /// Apply a status transition, appending to history; never rewrites or
    /// removes a prior entry.
    pub fn transition(&mut self, entry: StatusHistoryEntry) {
        self.status = entry.status;
        self.status_history.push(entry);
    }
}

/// A single LMM request/response exchange within a turn, persisted to the
/// conversation table and mirrored to `responses/turn{n}-conversation.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Which verification this belongs to.
    pub verification_id: VerificationId,
    /// 1 for Turn 1, 2 for Turn 2.
    pub turn_number: u8,
    /// The full message list sent to the LMM, including the rendered prompt.
    pub messages: Vec<Message>,
    /// The system prompt used, if any.
    pub system_prompt: Option<String>,
    /// Structured reasoning blocks the model returned, in order, if extended
    /// thinking was enabled for this exchange.
    pub assistant_reasoning_blocks: Option<Vec<ReasoningBlock>>,
    /// Token usage reported for this exchange.
    pub token_usage: TokenUsage,
    /// Measured latency for the LMM call, in milliseconds.
    pub bedrock_latency_ms: u64,
    /// The model id actually used.
    pub model_id: String,
}

/// A loaded, unrendered prompt template plus the metadata needed to locate
/// and cache it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Logical template name (e.g. `turn1_layout_vs_checking`).
    pub name: String,
    /// Template format version, from `TEMPLATE_VERSION`.
    pub version: String,
    /// The raw handlebars source.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_verification_starts_requested_with_empty_history() {
        let v = Verification::new(
            VerificationId::new("vm-1"),
            VerificationType::LayoutVsChecking,
            "2026/08/01",
        );
        assert_eq!(v.status, VerificationStatus::VerificationRequested);
        assert!(v.status_history.is_empty());
    }

    #[test]
    fn transition_updates_status_and_appends_history() {
        let mut v = Verification::new(
            VerificationId::new("vm-1"),
            VerificationType::LayoutVsChecking,
            "2026/08/01",
        );
        v.transition(StatusHistoryEntry::new(VerificationStatus::Turn1Started, 1));
        assert_eq!(v.status, VerificationStatus::Turn1Started);
        assert_eq!(v.status_history.len(), 1);
    }
}
