//! DynamoDB-backed key-value gateway, the production `VerificationTable` and
//! `ConversationTable` implementation. Client construction mirrors
//! `vmv_objectstore::s3::S3ObjectStore::from_env`'s use of the standard
//! `aws-config` loader.
//!
//! Records are serialized to `serde_json::Value` and converted to DynamoDB's
//! `AttributeValue` tree by hand rather than pulling in a mapping crate —
//! a small amount of explicit conversion code beats an extra dependency
//! when the shape is this direct.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use vmv_core::{ConversationRecord, Error, StatusHistoryEntry, TurnArtifact, Verification, VerificationId};

use crate::retry::with_adaptive_retry;
use crate::{ConversationTable, VerificationTable};

/// Production key-value gateway backed by two DynamoDB tables.
#[derive(Debug, Clone)]
pub struct DynamoKeyValueStore {
    client: aws_sdk_dynamodb::Client,
    verification_table: String,
    conversation_table: String,
    max_attempts: u32,
}

impl DynamoKeyValueStore {
    /// Build from an already-constructed SDK client and table names, with an
    /// explicit transport-retry ceiling (`MAX_RETRIES`).
    #[must_use]
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        verification_table: impl Into<String>,
        conversation_table: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            client,
            verification_table: verification_table.into(),
            conversation_table: conversation_table.into(),
            max_attempts,
        }
    }

    /// Build from the standard AWS config loader, for use at process
    /// bootstrap.
    pub async fn from_env(
        verification_table: impl Into<String>,
        conversation_table: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_dynamodb::Client::new(&config);
        Self::new(client, verification_table, conversation_table, max_attempts)
    }

    fn classify(&self, operation: &str, table: &str, err: impl std::fmt::Display) -> Error {
        let message = err.to_string();
        let vendor_error = Error::from_vendor_code(&message, message.clone());
        if vendor_error.kind().vendor_code().is_some() {
            vendor_error
        } else {
            Error::network(message)
        }
        .with_component("key_value")
        .with_operation(operation)
        .with_detail("table", table)
    }
}

fn json_to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute_value).collect()),
        Value::Object(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), json_to_attribute_value(v));
            }
            AttributeValue::M(out)
        }
    }
}

fn attribute_value_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => serde_json::Number::from_f64(n.parse().unwrap_or_default())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_value_to_json).collect()),
        AttributeValue::M(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), attribute_value_to_json(v));
            }
            Value::Object(out)
        }
        _ => Value::Null,
    }
}

fn item_to_value(item: &HashMap<String, AttributeValue>) -> Value {
    attribute_value_to_json(&AttributeValue::M(item.clone()))
}

fn serialize_to_item<T: Serialize>(value: &T) -> Result<HashMap<String, AttributeValue>, Error> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::response_parse(format!("failed to serialize record: {e}")))?;
    match json_to_attribute_value(&json) {
        AttributeValue::M(map) => Ok(map),
        _ => Err(Error::response_parse("record did not serialize to a map")),
    }
}

fn deserialize_from_item<T: DeserializeOwned>(item: &HashMap<String, AttributeValue>) -> Result<T, Error> {
    let json = item_to_value(item);
    serde_json::from_value(json).map_err(|e| Error::response_parse(format!("failed to deserialize record: {e}")))
}

#[async_trait]
impl VerificationTable for DynamoKeyValueStore {
    async fn create(&self, verification: &Verification) -> Result<(), Error> {
        let item = serialize_to_item(verification)?;
        with_adaptive_retry("verification_create", self.max_attempts, || async {
            self.client
                .put_item()
                .table_name(&self.verification_table)
                .set_item(Some(item.clone()))
                .condition_expression("attribute_not_exists(verification_id)")
                .send()
                .await
                .map_err(|e| self.classify("create", &self.verification_table, e))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &VerificationId) -> Result<Option<Verification>, Error> {
        let output = with_adaptive_retry("verification_get", self.max_attempts, || async {
            self.client
                .get_item()
                .table_name(&self.verification_table)
                .key("verification_id", AttributeValue::S(id.as_str().to_string()))
                .send()
                .await
                .map_err(|e| self.classify("get", &self.verification_table, e))
        })
        .await?;
        match output.item {
            Some(item) => Ok(Some(deserialize_from_item(&item)?)),
            None => Ok(None),
        }
    }

    async fn append_status(&self, id: &VerificationId, entry: StatusHistoryEntry) -> Result<(), Error> {
        let entry_json = serde_json::to_value(&entry)
            .map_err(|e| Error::response_parse(format!("failed to serialize status entry: {e}")))?;
        let entry_av = json_to_attribute_value(&entry_json);
        let status_json = serde_json::to_value(entry.status)
            .map_err(|e| Error::response_parse(format!("failed to serialize status: {e}")))?;
        let status_av = json_to_attribute_value(&status_json);

        with_adaptive_retry("verification_append_status", self.max_attempts, || async {
            self.client
                .update_item()
                .table_name(&self.verification_table)
                .key("verification_id", AttributeValue::S(id.as_str().to_string()))
                .update_expression(
                    "SET #status = :status, #history = list_append(if_not_exists(#history, :empty), :entry)",
                )
                .expression_attribute_names("#status", "status")
                .expression_attribute_names("#history", "status_history")
                .expression_attribute_values(":status", status_av.clone())
                .expression_attribute_values(":entry", AttributeValue::L(vec![entry_av.clone()]))
                .expression_attribute_values(":empty", AttributeValue::L(vec![]))
                .condition_expression("attribute_exists(verification_id)")
                .send()
                .await
                .map_err(|e| self.classify("append_status", &self.verification_table, e))?;
            Ok(())
        })
        .await
    }

    async fn replace_turn_artifacts(
        &self,
        id: &VerificationId,
        turn: u8,
        artifacts: TurnArtifact,
    ) -> Result<(), Error> {
        let field = match turn {
            1 => "turn1",
            2 => "turn2",
            other => return Err(Error::validation(format!("unknown turn number {other}"))),
        };
        let artifacts_json = serde_json::to_value(&artifacts)
            .map_err(|e| Error::response_parse(format!("failed to serialize turn artifacts: {e}")))?;
        let artifacts_av = json_to_attribute_value(&artifacts_json);

        with_adaptive_retry("verification_replace_turn_artifacts", self.max_attempts, || async {
            self.client
                .update_item()
                .table_name(&self.verification_table)
                .key("verification_id", AttributeValue::S(id.as_str().to_string()))
                .update_expression("SET #field = :artifacts")
                .expression_attribute_names("#field", field)
                .expression_attribute_values(":artifacts", artifacts_av.clone())
                .condition_expression("attribute_exists(verification_id)")
                .send()
                .await
                .map_err(|e| self.classify("replace_turn_artifacts", &self.verification_table, e))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ConversationTable for DynamoKeyValueStore {
    async fn put(&self, record: &ConversationRecord) -> Result<(), Error> {
        let item = serialize_to_item(record)?;
        with_adaptive_retry("conversation_put", self.max_attempts, || async {
            self.client
                .put_item()
                .table_name(&self.conversation_table)
                .set_item(Some(item.clone()))
                .send()
                .await
                .map_err(|e| self.classify("put", &self.conversation_table, e))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &VerificationId, turn_number: u8) -> Result<Option<ConversationRecord>, Error> {
        let output = with_adaptive_retry("conversation_get", self.max_attempts, || async {
            self.client
                .get_item()
                .table_name(&self.conversation_table)
                .key("verification_id", AttributeValue::S(id.as_str().to_string()))
                .key("turn_number", AttributeValue::N(turn_number.to_string()))
                .send()
                .await
                .map_err(|e| self.classify("get", &self.conversation_table, e))
        })
        .await?;
        match output.item {
            Some(item) => Ok(Some(deserialize_from_item(&item)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrips_through_attribute_value() {
        let original = serde_json::json!({
            "a": 1,
            "b": "text",
            "c": [1, 2, 3],
            "d": {"nested": true},
            "e": null,
        });
        let av = json_to_attribute_value(&original);
        let back = attribute_value_to_json(&av);
        assert_eq!(original, back);
    }
}
