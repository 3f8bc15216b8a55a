//! In-memory key-value store, grounded in `neuron-state-fs::FsStore`'s test
//! double role but backed by `HashMap`s so orchestrator tests run without
//! touching disk or a network.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vmv_core::{ConversationRecord, Error, StatusHistoryEntry, TurnArtifact, Verification, VerificationId};

use crate::{ConversationTable, VerificationTable};

/// A process-local, non-persistent key-value store implementing both
/// `VerificationTable` and `ConversationTable`.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    verifications: RwLock<HashMap<String, Verification>>,
    conversations: RwLock<HashMap<(String, u8), ConversationRecord>>,
}

impl InMemoryKeyValueStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationTable for InMemoryKeyValueStore {
    async fn create(&self, verification: &Verification) -> Result<(), Error> {
        let mut table = self.verifications.write().unwrap();
        let key = verification.verification_id.as_str().to_string();
        if table.contains_key(&key) {
            return Err(Error::validation(format!(
                "verification {key} already exists"
            )));
        }
        table.insert(key, verification.clone());
        Ok(())
    }

    async fn get(&self, id: &VerificationId) -> Result<Option<Verification>, Error> {
        Ok(self.verifications.read().unwrap().get(id.as_str()).cloned())
    }

    async fn append_status(&self, id: &VerificationId, entry: StatusHistoryEntry) -> Result<(), Error> {
        let mut table = self.verifications.write().unwrap();
        let verification = table
            .get_mut(id.as_str())
            .ok_or_else(|| Error::not_found(format!("verification {id} not found")))?;
        verification.transition(entry);
        Ok(())
    }

    async fn replace_turn_artifacts(
        &self,
        id: &VerificationId,
        turn: u8,
        artifacts: TurnArtifact,
    ) -> Result<(), Error> {
        let mut table = self.verifications.write().unwrap();
        let verification = table
            .get_mut(id.as_str())
            .ok_or_else(|| Error::not_found(format!("verification {id} not found")))?;
        match turn {
            1 => verification.turn1 = artifacts,
            2 => verification.turn2 = artifacts,
            other => return Err(Error::validation(format!("unknown turn number {other}"))),
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationTable for InMemoryKeyValueStore {
    async fn put(&self, record: &ConversationRecord) -> Result<(), Error> {
        let key = (record.verification_id.as_str().to_string(), record.turn_number);
        self.conversations.write().unwrap().insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, id: &VerificationId, turn_number: u8) -> Result<Option<ConversationRecord>, Error> {
        let key = (id.as_str().to_string(), turn_number);
        Ok(self.conversations.read().unwrap().get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmv_core::{VerificationStatus, VerificationType};

    fn sample_verification() -> Verification {
        Verification::new(VerificationId::new("vm-1"), VerificationType::LayoutVsChecking, "2026/08/01")
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = InMemoryKeyValueStore::new();
        store.create(&sample_verification()).await.unwrap();
        let back = VerificationTable::get(&store, &VerificationId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(back.verification_id.as_str(), "vm-1");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryKeyValueStore::new();
        store.create(&sample_verification()).await.unwrap();
        assert!(store.create(&sample_verification()).await.is_err());
    }

    #[tokio::test]
    async fn append_status_on_missing_record_fails() {
        let store = InMemoryKeyValueStore::new();
        let result = store
            .append_status(
                &VerificationId::new("missing"),
                StatusHistoryEntry::new(VerificationStatus::Turn1Started, 1),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn append_status_initializes_history_on_first_call() {
        let store = InMemoryKeyValueStore::new();
        let id = VerificationId::new("vm-1");
        store.create(&sample_verification()).await.unwrap();
        store
            .append_status(&id, StatusHistoryEntry::new(VerificationStatus::Turn1Started, 1))
            .await
            .unwrap();
        let back = VerificationTable::get(&store, &id).await.unwrap().unwrap();
        assert_eq!(back.status_history.len(), 1);
        assert_eq!(back.status, VerificationStatus::Turn1Started);
    }

    #[tokio::test]
    async fn replace_turn_artifacts_swaps_whole_map() {
        let store = InMemoryKeyValueStore::new();
        let id = VerificationId::new("vm-1");
        store.create(&sample_verification()).await.unwrap();
        store.replace_turn_artifacts(&id, 1, TurnArtifact::default()).await.unwrap();
        let back = VerificationTable::get(&store, &id).await.unwrap().unwrap();
        assert!(back.turn1.processed_response.is_none());
    }

    #[tokio::test]
    async fn conversation_put_then_get_roundtrips() {
        let store = InMemoryKeyValueStore::new();
        let record = ConversationRecord {
            verification_id: VerificationId::new("vm-1"),
            turn_number: 1,
            messages: vec![],
            system_prompt: None,
            assistant_reasoning_blocks: None,
            token_usage: Default::default(),
            bedrock_latency_ms: 0,
            model_id: "anthropic.claude-3".to_string(),
        };
        store.put(&record).await.unwrap();
        let back = ConversationTable::get(&store, &VerificationId::new("vm-1"), 1).await.unwrap().unwrap();
        assert_eq!(back.model_id, "anthropic.claude-3");
    }
}
