//! Key-value gateway: idempotent status tracking for verification and
//! conversation records.
//!
//! Split into two small, object-safe `#[async_trait]` traits the way
//! `layer0::state::StateStore` is one trait the orchestrator depends on
//! abstractly — `VerificationTable` and `ConversationTable` — each with a
//! DynamoDB implementation and an in-memory test double.

#![deny(missing_docs)]

pub mod dynamo;
pub mod memory;
pub mod retry;

pub use dynamo::DynamoKeyValueStore;
pub use memory::InMemoryKeyValueStore;

use async_trait::async_trait;
use vmv_core::{ConversationRecord, Error, StatusHistoryEntry, Verification, VerificationId};

/// Gateway to the verification record table. Updates are either
/// list-append (status history) or whole-map-replace (turn artifacts),
/// never a partial nested-path update, which is what keeps `put_item`-style
/// backends from ever raising a "document path does not exist" conflict.
#[async_trait]
pub trait VerificationTable: Send + Sync {
    /// Insert a brand-new verification record. Fails if one already exists.
    async fn create(&self, verification: &Verification) -> Result<(), Error>;

    /// Fetch a verification record by id.
    async fn get(&self, id: &VerificationId) -> Result<Option<Verification>, Error>;

    /// Append one status history entry and update `status` to match,
    /// initializing the history list first if this is the first entry.
    async fn append_status(&self, id: &VerificationId, entry: StatusHistoryEntry) -> Result<(), Error>;

    /// Replace the whole `turn1`/`turn2` artifact map for this verification
    /// (never a partial field update, to avoid document-path races).
    async fn replace_turn_artifacts(
        &self,
        id: &VerificationId,
        turn: u8,
        artifacts: vmv_core::TurnArtifact,
    ) -> Result<(), Error>;
}

/// Gateway to the conversation record table, one row per `(verification_id,
/// turn_number)`.
#[async_trait]
pub trait ConversationTable: Send + Sync {
    /// Insert or replace a conversation record for one turn.
    async fn put(&self, record: &ConversationRecord) -> Result<(), Error>;

    /// Fetch the conversation record for a given verification and turn.
    async fn get(&self, id: &VerificationId, turn_number: u8) -> Result<Option<ConversationRecord>, Error>;
}
