//! The canonical stage output shape: what every stage invocation
//! returns on stdout, success or failure.

use std::collections::BTreeMap;

use serde::Serialize;
use vmv_core::{ArtifactReference, Error, TokenUsage, VerificationId, VerificationStatus};

/// Schema version stamped on every stage output, so a downstream consumer
/// can tell which shape it is parsing without sniffing fields.
pub const SCHEMA_VERSION: &str = "2.1.0";

/// Discrepancy entry for Turn-2's comparison output.
#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    /// Row label.
    pub row: String,
    /// Column index (1-based).
    pub column: u32,
    /// What was expected at this slot.
    pub expected: String,
    /// What was observed instead.
    pub observed: String,
    /// Severity classification from the model's own judgment.
    pub severity: String,
}

/// Per-call and per-stage measurements reported alongside a stage's result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageSummary {
    /// Measured LMM call latency, if the call was reached.
    pub bedrock_latency_ms: Option<u64>,
    /// Token usage for the LMM call, if it was reached.
    pub token_usage: Option<TokenUsage>,
    /// Whether the verification row was successfully updated with this
    /// stage's final status.
    pub dynamodb_updated: bool,
    /// Measured end-to-end stage duration.
    pub processing_time_ms: u64,
}

/// The canonical JSON object returned from one stage invocation: a
/// `schema_version`-stamped envelope over a map of named artifact
/// references plus a summary of what the call did.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutput {
    /// Which verification this output is for.
    pub verification_id: VerificationId,
    /// The status the stage ended in (always terminal).
    pub status: VerificationStatus,
    /// Schema version of this output shape.
    pub schema_version: String,
    /// Named object-store references this invocation produced or resolved,
    /// keyed by logical name (`prompts_turn1_prompt`,
    /// `responses_turn1_processed`, ...).
    pub s3_references: BTreeMap<String, ArtifactReference>,
    /// Measurements for this invocation.
    pub summary: StageSummary,
    /// Parsed discrepancies, for Turn-2 outputs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancies: Option<Vec<Discrepancy>>,
    /// The terminating error, present iff `status` is a failure status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl StageOutput {
    /// Whether this output represents success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
