use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use tracing::{debug, warn};

use super::KvClient;
use crate::error::KvError;

/// DynamoDB-based backend.
///
/// Table schema:
///   PK: session_id (S)
///   Fields: payload (S), updated_at (S, RFC 3339)
///
/// No TTL attribute is written; record lifetime is not managed here.
pub struct DynamoKvClient {
    client: Client,
    table_name: String,
    closed: AtomicBool,
}

impl DynamoKvClient {
    pub fn new(client: Client, table_name: String) -> Self {
        Self {
            client,
            table_name,
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl KvClient for DynamoKvClient {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check_open()?;
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                warn!("DynamoDB get_item error: {}", e);
                KvError::Backend(e.to_string())
            })?;

        let Some(item) = output.item else {
            return Ok(None);
        };
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| KvError::Backend(format!("record {key} has no payload")))?;
        Ok(Some(payload))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.check_open()?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("session_id", AttributeValue::S(key.to_string()))
            .item("payload", AttributeValue::S(value.to_string()))
            .item(
                "updated_at",
                AttributeValue::S(chrono::Utc::now().to_rfc3339()),
            )
            .send()
            .await
            .map_err(|e| {
                warn!("DynamoDB put_item error: {}", e);
                KvError::Backend(e.to_string())
            })?;
        debug!("Stored session record in {}", self.table_name);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.check_open()?;
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(key.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| {
                warn!("DynamoDB delete_item error: {}", e);
                KvError::Backend(e.to_string())
            })?;
        Ok(output.attributes.is_some_and(|attrs| !attrs.is_empty()))
    }

    async fn close(&self) {
        // The SDK client holds no connections that need explicit shutdown
        self.closed.store(true, Ordering::Release);
    }
}
