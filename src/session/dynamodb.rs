//! DynamoDB session store for production deployments.
//!
//! Table schema:
//! - `session_id` (S) — partition key
//! - `record` (S) — JSON-encoded `SessionRecord`
//! - `version` (N) — optimistic-concurrency counter
//! - `ttl` (N) — `expires_at`, for DynamoDB's native item expiry
//!
//! All reads are strongly consistent so a write from one worker is visible
//! to a load from any other, and every call carries a client-side timeout;
//! a hung network call fails the request instead of wedging it.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use std::time::Duration;

use super::{SessionRecord, SessionStore, StoreError, WriteGuard};

pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    op_timeout: Duration,
}

impl DynamoDbStore {
    pub fn new(client: Client, table_name: String, op_timeout: Duration) -> Self {
        Self {
            client,
            table_name,
            op_timeout,
        }
    }
}

/// A stored record that no longer parses (corrupt or legacy encoding)
/// degrades to "absent" so the worker mints a fresh session instead of
/// failing the request.
pub(crate) fn decode_record(json: &str) -> Option<SessionRecord> {
    match serde_json::from_str(json) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "undecodable session record, treating as absent");
            None
        }
    }
}

impl SessionStore for DynamoDbStore {
    async fn load(&self, session_id: &str) -> Result<Option<(SessionRecord, u64)>, StoreError> {
        let request = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .consistent_read(true)
            .send();

        let output = match tokio::time::timeout(self.op_timeout, request).await {
            Err(_) => return Err(StoreError::Timeout),
            Ok(Err(e)) => return Err(StoreError::Unavailable(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let Some(item) = output.item else {
            return Ok(None);
        };

        let version = item
            .get("version")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(1);

        let Some(json) = item.get("record").and_then(|v| v.as_s().ok()) else {
            tracing::warn!("session item missing record attribute, treating as absent");
            return Ok(None);
        };

        Ok(decode_record(json).map(|record| (record, version)))
    }

    async fn save(
        &self,
        session_id: &str,
        record: &SessionRecord,
        guard: WriteGuard,
    ) -> Result<u64, StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Unavailable(format!("record encoding failed: {e}")))?;

        let new_version = match guard {
            WriteGuard::Overwrite(version) => version,
            WriteGuard::IfAbsent => 1,
            WriteGuard::IfVersion(expected) => expected + 1,
        };

        let mut put = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("session_id", AttributeValue::S(session_id.to_string()))
            .item("record", AttributeValue::S(json))
            .item("version", AttributeValue::N(new_version.to_string()))
            .item("ttl", AttributeValue::N(record.expires_at.to_string()));

        match guard {
            WriteGuard::Overwrite(_) => {}
            WriteGuard::IfAbsent => {
                put = put.condition_expression("attribute_not_exists(session_id)");
            }
            WriteGuard::IfVersion(expected) => {
                put = put
                    .condition_expression("version = :expected")
                    .expression_attribute_values(
                        ":expected",
                        AttributeValue::N(expected.to_string()),
                    );
            }
        }

        match tokio::time::timeout(self.op_timeout, put.send()).await {
            Err(_) => Err(StoreError::Timeout),
            Ok(Ok(_)) => Ok(new_version),
            Ok(Err(e)) => {
                let service_err = e.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(StoreError::VersionConflict)
                } else {
                    Err(StoreError::Unavailable(service_err.to_string()))
                }
            }
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("session_id", AttributeValue::S(session_id.to_string()))
            .send();

        match tokio::time::timeout(self.op_timeout, request).await {
            Err(_) => Err(StoreError::Timeout),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let request = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send();

        match tokio::time::timeout(self.op_timeout, request).await {
            Err(_) => Err(StoreError::Timeout),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Ok(Ok(_)) => Ok(()),
        }
    }
}
