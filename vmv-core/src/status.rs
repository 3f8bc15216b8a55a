//! Verification status vocabulary: the canonical status sequence for Turn 1,
//! extended with a `TURN2_` mirror covering the Turn-2 stage.

use serde::{Deserialize, Serialize};

use crate::duration::DurationMs;
use crate::error::Error;

/// The kind of verification being run. Determines which prompt template
/// family and context-loading shape the context loader uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationType {
    /// Compare a layout against a single reference image.
    LayoutVsChecking,
    /// Compare the current checking image against the previous one.
    PreviousVsCurrent,
}

/// A status value in the canonical sequence. Non-exhaustive because the
/// vendor-facing terminal statuses are a fixed closed set per stage, but new
/// stages (beyond Turn-1/Turn-2) would add their own prefix family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Initial state once the event has been normalized.
    VerificationRequested,
    /// Turn 1 has begun.
    Turn1Started,
    /// Turn 1's context (system prompt, images, history) has loaded.
    Turn1ContextLoaded,
    /// Turn 1's prompt has been rendered.
    Turn1PromptPrepared,
    /// Turn 1's LMM invocation has returned.
    Turn1BedrockInvoked,
    /// Turn 1's response has been parsed into structured artifacts.
    Turn1ResponseParsed,
    /// Turn 1's artifacts have been written to the object store.
    Turn1ArtifactsStored,
    /// Turn 1 completed successfully — terminal.
    Turn1Completed,
    /// Turn 1 failed for a reason outside template/vendor classification — terminal.
    Turn1Error,
    /// Turn 1 failed while loading or rendering the prompt template — terminal.
    TemplateProcessingError,
    /// Turn 1 failed due to a classified vendor/LMM error — terminal.
    BedrockProcessingFailed,
    /// Turn 2 has begun.
    Turn2Started,
    /// Turn 2's context has loaded.
    Turn2ContextLoaded,
    /// Turn 2's prompt has been rendered.
    Turn2PromptPrepared,
    /// Turn 2's LMM invocation has returned.
    Turn2BedrockInvoked,
    /// Turn 2's response has been parsed.
    Turn2ResponseParsed,
    /// Turn 2's artifacts have been written.
    Turn2ArtifactsStored,
    /// Turn 2 completed successfully — terminal.
    Turn2Completed,
    /// Turn 2 failed for a reason outside template/vendor classification — terminal.
    Turn2Error,
}

impl VerificationStatus {
    /// Whether this status ends the stage (no further transitions follow).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Turn1Completed
                | Self::Turn1Error
                | Self::TemplateProcessingError
                | Self::BedrockProcessingFailed
                | Self::Turn2Completed
                | Self::Turn2Error
        )
    }

    /// Whether this terminal status represents success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Turn1Completed | Self::Turn2Completed)
    }
}

/// One entry in the status history append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// The status reached.
    pub status: VerificationStatus,
    /// Epoch milliseconds when this status was recorded.
    pub timestamp_ms: u64,
    /// How long the previous status was held before this transition.
    pub duration_ms: Option<DurationMs>,
    /// The error that caused this transition, if it is a terminal failure.
    pub error: Option<Error>,
}

impl StatusHistoryEntry {
    /// Build a non-error entry.
    #[must_use]
    pub fn new(status: VerificationStatus, timestamp_ms: u64) -> Self {
        Self {
            status,
            timestamp_ms,
            duration_ms: None,
            error: None,
        }
    }

    /// Attach the duration the previous status was held.
    #[must_use]
    pub fn with_duration(mut self, duration_ms: DurationMs) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach the terminating error.
    #[must_use]
    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_named_statuses_are_terminal() {
        assert!(VerificationStatus::Turn1Completed.is_terminal());
        assert!(VerificationStatus::Turn1Error.is_terminal());
        assert!(!VerificationStatus::Turn1ContextLoaded.is_terminal());
    }

    #[test]
    fn only_completed_statuses_are_success() {
        assert!(VerificationStatus::Turn1Completed.is_success());
        assert!(!VerificationStatus::Turn1Error.is_success());
        assert!(!VerificationStatus::BedrockProcessingFailed.is_success());
    }
}
