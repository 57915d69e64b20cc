//! Offline queue and dead-letter records

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Mutation recorded while the remote was unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

crate::impl_domain_status_conversions!(OperationKind {
    Insert => "insert",
    Update => "update",
    Delete => "delete",
});

/// Entity a queued mutation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Transaction,
    Category,
}

crate::impl_domain_status_conversions!(EntityKind {
    Transaction => "transaction",
    Category => "category",
});

/// Input to `enqueue`; the queue assigns id, idempotency key and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    /// Signed-in user the mutation belongs to
    pub user_id: i64,
    pub operation_kind: OperationKind,
    pub entity_kind: EntityKind,
    pub payload_json: String,
}

impl NewOperation {
    /// Snapshot `entity` into a new operation owned by `user_id`.
    ///
    /// # Errors
    /// Returns [`crate::FinTrackError::InvalidInput`] if the entity cannot
    /// be serialized.
    pub fn from_entity<T: Serialize>(
        user_id: i64,
        operation_kind: OperationKind,
        entity_kind: EntityKind,
        entity: &T,
    ) -> Result<Self> {
        Ok(Self {
            user_id,
            operation_kind,
            entity_kind,
            payload_json: serde_json::to_string(entity)?,
        })
    }
}

/// A durably queued mutation awaiting replay.
///
/// `payload_json` is fixed at enqueue time. Ordering is by
/// `(enqueued_at, id)`. Only a session for `user_id` may replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: i64,
    pub user_id: i64,
    pub idempotency_key: String,
    pub operation_kind: OperationKind,
    pub entity_kind: EntityKind,
    pub payload_json: String,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: i64,
    pub retry_count: u32,
}

impl QueuedOperation {
    /// Decode the payload snapshot.
    ///
    /// # Errors
    /// Returns [`crate::FinTrackError::InvalidInput`] when the payload does
    /// not decode as `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload_json)?)
    }
}

/// Why an operation left the queue without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterReason {
    /// Retry budget consumed by transient failures.
    Exhausted,
    /// The server refused the payload; resubmitting would fail the same way.
    Rejected,
}

crate::impl_domain_status_conversions!(DeadLetterReason {
    Exhausted => "exhausted",
    Rejected => "rejected",
});

/// Durable record of an operation that permanently failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: i64,
    pub operation_id: i64,
    pub user_id: i64,
    pub idempotency_key: String,
    pub operation_kind: OperationKind,
    pub entity_kind: EntityKind,
    pub payload_json: String,
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub reason: DeadLetterReason,
    pub last_error: String,
    /// Milliseconds since the Unix epoch.
    pub failed_at: i64,
}

/// Minimal view of a payload used to find the target of update/delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(default)]
    pub id: Option<i64>,
}
