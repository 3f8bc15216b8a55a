//! Deterministic object key layout, date-partitioned per verification.

use vmv_core::VerificationId;

/// Builds the `{date_partition}/{verification_id}/...` key prefix every
/// artifact for one verification is written under.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    date_partition: String,
    verification_id: VerificationId,
}

impl KeyLayout {
    /// Build a layout for one verification under its date partition.
    #[must_use]
    pub fn new(date_partition: impl Into<String>, verification_id: VerificationId) -> Self {
        Self {
            date_partition: date_partition.into(),
            verification_id,
        }
    }

    fn prefix(&self) -> String {
        format!("{}/{}", self.date_partition, self.verification_id)
    }

    /// `images/reference.base64`
    #[must_use]
    pub fn reference_image(&self) -> String {
        format!("{}/images/reference.base64", self.prefix())
    }

    /// `images/checking.base64`
    #[must_use]
    pub fn checking_image(&self) -> String {
        format!("{}/images/checking.base64", self.prefix())
    }

    /// `response/turn{n}-processed-response.md`, the canonical pointer target.
    /// Never written to directly — see [`Self::processed_response_attempt`].
    #[must_use]
    pub fn processed_response(&self, turn: u8) -> String {
        format!("{}/response/turn{}-processed-response.md", self.prefix(), turn)
    }

    /// `response/turn{n}-processed-response-{timestamp_ms}.json`, a snapshot
    /// key unique to one attempt. Write-new-then-publish: the stage writes
    /// here first and only then records this key as the turn's canonical
    /// reference, so a retried attempt never collides with one that already
    /// succeeded.
    #[must_use]
    pub fn processed_response_attempt(&self, turn: u8, timestamp_ms: u64) -> String {
        format!(
            "{}/response/turn{}-processed-response-{timestamp_ms}.md",
            self.prefix(),
            turn
        )
    }

    /// `responses/turn{n}-raw-response.json`, the canonical pointer target.
    #[must_use]
    pub fn raw_response(&self, turn: u8) -> String {
        format!("{}/responses/turn{}-raw-response.json", self.prefix(), turn)
    }

    /// `responses/turn{n}-raw-response-{timestamp_ms}.json`, an attempt-qualified
    /// snapshot key; see [`Self::processed_response_attempt`].
    #[must_use]
    pub fn raw_response_attempt(&self, turn: u8, timestamp_ms: u64) -> String {
        format!(
            "{}/responses/turn{}-raw-response-{timestamp_ms}.json",
            self.prefix(),
            turn
        )
    }

    /// `responses/turn{n}-conversation.json`, the canonical pointer target.
    #[must_use]
    pub fn conversation(&self, turn: u8) -> String {
        format!("{}/responses/turn{}-conversation.json", self.prefix(), turn)
    }

    /// `responses/turn{n}-conversation-{timestamp_ms}.json`, an attempt-qualified
    /// snapshot key; see [`Self::processed_response_attempt`].
    #[must_use]
    pub fn conversation_attempt(&self, turn: u8, timestamp_ms: u64) -> String {
        format!(
            "{}/responses/turn{}-conversation-{timestamp_ms}.json",
            self.prefix(),
            turn
        )
    }

    /// `prompts/system-prompt.json`
    #[must_use]
    pub fn system_prompt(&self) -> String {
        format!("{}/prompts/system-prompt.json", self.prefix())
    }

    /// `prompts/turn{n}-prompt.json`
    #[must_use]
    pub fn prompt(&self, turn: u8) -> String {
        format!("{}/prompts/turn{}-prompt.json", self.prefix(), turn)
    }

    /// `processing/layout-metadata.json`
    #[must_use]
    pub fn layout_metadata(&self) -> String {
        format!("{}/processing/layout-metadata.json", self.prefix())
    }

    /// `processing/historical-context.json`
    #[must_use]
    pub fn historical_context(&self) -> String {
        format!("{}/processing/historical-context.json", self.prefix())
    }

    /// `initialization/initialization.json`
    #[must_use]
    pub fn initialization(&self) -> String {
        format!("{}/initialization/initialization.json", self.prefix())
    }

    /// `images/metadata.json`
    #[must_use]
    pub fn images_metadata(&self) -> String {
        format!("{}/images/metadata.json", self.prefix())
    }

    /// `processing/workflow-state.json`
    #[must_use]
    pub fn workflow_state(&self) -> String {
        format!("{}/processing/workflow-state.json", self.prefix())
    }

    /// `processing/status-history.json`
    #[must_use]
    pub fn status_history(&self) -> String {
        format!("{}/processing/status-history.json", self.prefix())
    }

    /// `processing/snapshots/state-{timestamp_ms}.json`
    #[must_use]
    pub fn snapshot(&self, timestamp_ms: u64) -> String {
        format!("{}/processing/snapshots/state-{timestamp_ms}.json", self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> KeyLayout {
        KeyLayout::new("2026/08/01", VerificationId::new("vm-1"))
    }

    #[test]
    fn keys_are_partitioned_by_date_and_verification() {
        assert_eq!(layout().reference_image(), "2026/08/01/vm-1/images/reference.base64");
        assert_eq!(
            layout().processed_response(1),
            "2026/08/01/vm-1/response/turn1-processed-response.md"
        );
        assert_eq!(
            layout().conversation(2),
            "2026/08/01/vm-1/responses/turn2-conversation.json"
        );
    }

    #[test]
    fn snapshot_key_includes_timestamp() {
        assert_eq!(
            layout().snapshot(12345),
            "2026/08/01/vm-1/processing/snapshots/state-12345.json"
        );
    }

    #[test]
    fn attempt_keys_are_distinct_from_the_canonical_key() {
        let keys = layout();
        assert_eq!(
            keys.processed_response(1),
            "2026/08/01/vm-1/response/turn1-processed-response.md"
        );
        assert_eq!(
            keys.processed_response_attempt(1, 12345),
            "2026/08/01/vm-1/response/turn1-processed-response-12345.md"
        );
        assert_ne!(keys.processed_response(1), keys.processed_response_attempt(1, 12345));
        assert_eq!(
            keys.raw_response_attempt(1, 12345),
            "2026/08/01/vm-1/responses/turn1-raw-response-12345.json"
        );
        assert_eq!(
            keys.conversation_attempt(1, 12345),
            "2026/08/01/vm-1/responses/turn1-conversation-12345.json"
        );
    }

    #[test]
    fn context_and_prompt_keys_match_the_fixed_layout() {
        let keys = layout();
        assert_eq!(keys.system_prompt(), "2026/08/01/vm-1/prompts/system-prompt.json");
        assert_eq!(keys.prompt(1), "2026/08/01/vm-1/prompts/turn1-prompt.json");
        assert_eq!(keys.layout_metadata(), "2026/08/01/vm-1/processing/layout-metadata.json");
        assert_eq!(
            keys.historical_context(),
            "2026/08/01/vm-1/processing/historical-context.json"
        );
        assert_eq!(
            keys.initialization(),
            "2026/08/01/vm-1/initialization/initialization.json"
        );
        assert_eq!(keys.images_metadata(), "2026/08/01/vm-1/images/metadata.json");
    }
}
