//! Port interfaces for sync operations

use async_trait::async_trait;
use fintrack_domain::{
    Category, Credentials, DeadLetter, DeadLetterReason, LoginResponse, NewOperation,
    QueuedOperation, RegisterRequest, RegisterResponse, Result, Transaction, TransactionFilter,
};

use super::errors::SyncError;

/// Durable FIFO of operations awaiting replay
#[async_trait]
pub trait OperationQueue: Send + Sync {
    /// Persist an operation with a fresh idempotency key, `enqueued_at = now`
    /// and `retry_count = 0`. Returns only once the row is durable.
    async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation>;

    /// All unresolved operations ordered by `(enqueued_at, id)`
    async fn pending(&self) -> Result<Vec<QueuedOperation>>;

    /// Unresolved operations owned by `user_id`, same order as [`Self::pending`]
    async fn pending_for(&self, user_id: i64) -> Result<Vec<QueuedOperation>>;

    /// Increment the retry counter and return the new value
    async fn increment_retry(&self, id: i64) -> Result<u32>;

    /// Remove an operation after a successful replay
    async fn remove(&self, id: i64) -> Result<bool>;

    /// Number of unresolved operations
    async fn count(&self) -> Result<usize>;
}

/// Durable record of operations that left the queue without succeeding
#[async_trait]
pub trait DeadLetterLog: Send + Sync {
    /// Remove `operation` from the queue and record it, atomically
    async fn move_to_dead_letter(
        &self,
        operation: &QueuedOperation,
        reason: DeadLetterReason,
        last_error: &str,
    ) -> Result<DeadLetter>;

    /// Dead letters, oldest failure first
    async fn list(&self) -> Result<Vec<DeadLetter>>;

    async fn count(&self) -> Result<usize>;

    /// Move an entry back to the queue with a reset retry budget
    async fn requeue(&self, dead_letter_id: i64) -> Result<QueuedOperation>;

    /// Delete every dead letter
    async fn purge(&self) -> Result<usize>;
}

/// Remote API as seen by the client.
///
/// Mutations accept an optional idempotency key; the replay engine always
/// sends one, direct online calls do not.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Authenticate and keep the returned bearer token for later calls
    async fn login(&self, credentials: &Credentials) -> std::result::Result<LoginResponse, SyncError>;

    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> std::result::Result<RegisterResponse, SyncError>;

    /// Revoke the current token and forget it
    async fn logout(&self) -> std::result::Result<(), SyncError>;

    /// User the current bearer token was issued to, if any
    fn session_user(&self) -> Option<i64>;

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> std::result::Result<Vec<Transaction>, SyncError>;

    async fn create_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Transaction, SyncError>;

    async fn update_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Transaction, SyncError>;

    async fn delete_transaction(
        &self,
        id: i64,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<(), SyncError>;

    async fn list_categories(&self) -> std::result::Result<Vec<Category>, SyncError>;

    async fn create_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Category, SyncError>;

    async fn update_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Category, SyncError>;

    async fn delete_category(
        &self,
        id: i64,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<(), SyncError>;
}
