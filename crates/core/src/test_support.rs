//! In-memory port implementations shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fintrack_domain::{
    Category, Credentials, DeadLetter, DeadLetterReason, EntityKind, FinTrackError, LoginResponse,
    NewOperation, QueuedOperation, RegisterRequest, RegisterResponse, Result, Transaction,
    TransactionFilter, UserSummary,
};
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;

use crate::connectivity::ReachabilityProbe;
use crate::finance::ports::{CacheEntry, LocalCache};
use crate::sync::errors::SyncError;
use crate::sync::ports::{DeadLetterLog, OperationQueue, RemoteClient};

#[derive(Default)]
struct QueueState {
    next_id: i64,
    next_dead_id: i64,
    tick: i64,
    pending: Vec<QueuedOperation>,
    dead: Vec<DeadLetter>,
}

/// Queue and dead-letter log over one shared in-memory state.
#[derive(Default)]
pub struct InMemoryQueue {
    state: TokioMutex<QueueState>,
    fail_writes: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FinTrackError::Database("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationQueue for InMemoryQueue {
    async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        state.tick += 1;
        let queued = QueuedOperation {
            id: state.next_id,
            user_id: operation.user_id,
            idempotency_key: uuid::Uuid::new_v4().to_string(),
            operation_kind: operation.operation_kind,
            entity_kind: operation.entity_kind,
            payload_json: operation.payload_json,
            enqueued_at: state.tick,
            retry_count: 0,
        };
        state.pending.push(queued.clone());
        Ok(queued)
    }

    async fn pending(&self) -> Result<Vec<QueuedOperation>> {
        let mut pending = self.state.lock().await.pending.clone();
        pending.sort_by_key(|op| (op.enqueued_at, op.id));
        Ok(pending)
    }

    async fn pending_for(&self, user_id: i64) -> Result<Vec<QueuedOperation>> {
        let mut pending = self.pending().await?;
        pending.retain(|op| op.user_id == user_id);
        Ok(pending)
    }

    async fn increment_retry(&self, id: i64) -> Result<u32> {
        let mut state = self.state.lock().await;
        let op = state
            .pending
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| FinTrackError::NotFound(format!("operation {id}")))?;
        op.retry_count += 1;
        Ok(op.retry_count)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|op| op.id != id);
        Ok(state.pending.len() != before)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.pending.len())
    }
}

#[async_trait]
impl DeadLetterLog for InMemoryQueue {
    async fn move_to_dead_letter(
        &self,
        operation: &QueuedOperation,
        reason: DeadLetterReason,
        last_error: &str,
    ) -> Result<DeadLetter> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let stored = state.pending.iter().find(|op| op.id == operation.id).cloned();
        let source = stored.unwrap_or_else(|| operation.clone());
        state.pending.retain(|op| op.id != operation.id);

        state.next_dead_id += 1;
        state.tick += 1;
        let entry = DeadLetter {
            id: state.next_dead_id,
            operation_id: source.id,
            user_id: source.user_id,
            idempotency_key: source.idempotency_key,
            operation_kind: source.operation_kind,
            entity_kind: source.entity_kind,
            payload_json: source.payload_json,
            enqueued_at: source.enqueued_at,
            retry_count: source.retry_count,
            reason,
            last_error: last_error.to_string(),
            failed_at: state.tick,
        };
        state.dead.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state.lock().await.dead.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.dead.len())
    }

    async fn requeue(&self, dead_letter_id: i64) -> Result<QueuedOperation> {
        let mut state = self.state.lock().await;
        let position = state
            .dead
            .iter()
            .position(|entry| entry.id == dead_letter_id)
            .ok_or_else(|| FinTrackError::NotFound(format!("dead letter {dead_letter_id}")))?;
        let entry = state.dead.remove(position);

        state.next_id += 1;
        state.tick += 1;
        let queued = QueuedOperation {
            id: state.next_id,
            user_id: entry.user_id,
            idempotency_key: entry.idempotency_key,
            operation_kind: entry.operation_kind,
            entity_kind: entry.entity_kind,
            payload_json: entry.payload_json,
            enqueued_at: state.tick,
            retry_count: 0,
        };
        state.pending.push(queued.clone());
        Ok(queued)
    }

    async fn purge(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.dead.len();
        state.dead.clear();
        Ok(removed)
    }
}

/// Remote call as observed by [`ScriptedRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Login { username: String },
    Register { username: String },
    Logout,
    ListTransactions,
    CreateTransaction { description: String, idempotency_key: Option<String> },
    UpdateTransaction { id: Option<i64>, idempotency_key: Option<String> },
    DeleteTransaction { id: i64, idempotency_key: Option<String> },
    ListCategories,
    CreateCategory { name: String, idempotency_key: Option<String> },
    UpdateCategory { id: Option<i64>, idempotency_key: Option<String> },
    DeleteCategory { id: i64, idempotency_key: Option<String> },
}

/// Remote client that records calls and fails on demand.
///
/// Logins hand out user ids in order of first appearance, starting at 1.
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<RemoteCall>>,
    accounts: Mutex<Vec<String>>,
    session: Mutex<Option<i64>>,
    failures: Mutex<VecDeque<SyncError>>,
    always: Mutex<Option<SyncError>>,
    delay: Mutex<Option<Duration>>,
    next_id: AtomicI64,
    transactions: Mutex<Vec<Transaction>>,
    categories: Mutex<Vec<Category>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(100), ..Self::default() }
    }

    pub fn fail_next(&self, err: SyncError) {
        self.failures.lock().push_back(err);
    }

    pub fn fail_always(&self, err: SyncError) {
        *self.always.lock() = Some(err);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn sign_in_as(&self, user_id: i64) {
        *self.session.lock() = Some(user_id);
    }

    pub fn sign_out(&self) {
        *self.session.lock() = None;
    }

    pub fn set_transactions(&self, transactions: Vec<Transaction>) {
        *self.transactions.lock() = transactions;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    async fn record(&self, call: RemoteCall) -> std::result::Result<(), SyncError> {
        self.calls.lock().push(call);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        match self.always.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn assign_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn account_id(&self, username: &str) -> i64 {
        let mut accounts = self.accounts.lock();
        let position = match accounts.iter().position(|name| name == username) {
            Some(position) => position,
            None => {
                accounts.push(username.to_string());
                accounts.len() - 1
            }
        };
        i64::try_from(position).unwrap_or_default() + 1
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn login(&self, credentials: &Credentials) -> std::result::Result<LoginResponse, SyncError> {
        self.record(RemoteCall::Login { username: credentials.username.clone() }).await?;
        let user_id = self.account_id(&credentials.username);
        self.sign_in_as(user_id);
        Ok(LoginResponse {
            token: format!("token-{user_id}"),
            user: UserSummary { id: user_id, username: credentials.username.clone() },
            user_id,
        })
    }

    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> std::result::Result<RegisterResponse, SyncError> {
        self.record(RemoteCall::Register { username: request.username.clone() }).await?;
        Ok(RegisterResponse { user_id: self.assign_id(), username: request.username.clone() })
    }

    async fn logout(&self) -> std::result::Result<(), SyncError> {
        self.sign_out();
        self.record(RemoteCall::Logout).await
    }

    fn session_user(&self) -> Option<i64> {
        *self.session.lock()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> std::result::Result<Vec<Transaction>, SyncError> {
        self.record(RemoteCall::ListTransactions).await?;
        Ok(self.transactions.lock().iter().filter(|tx| filter.matches(tx)).cloned().collect())
    }

    async fn create_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Transaction, SyncError> {
        self.record(RemoteCall::CreateTransaction {
            description: transaction.details().description.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await?;
        let mut stored = transaction.clone();
        stored.details_mut().id = Some(self.assign_id());
        stored.details_mut().user_id = self.session_user();
        Ok(stored)
    }

    async fn update_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Transaction, SyncError> {
        self.record(RemoteCall::UpdateTransaction {
            id: transaction.id(),
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await?;
        Ok(transaction.clone())
    }

    async fn delete_transaction(
        &self,
        id: i64,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<(), SyncError> {
        self.record(RemoteCall::DeleteTransaction {
            id,
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await
    }

    async fn list_categories(&self) -> std::result::Result<Vec<Category>, SyncError> {
        self.record(RemoteCall::ListCategories).await?;
        Ok(self.categories.lock().clone())
    }

    async fn create_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Category, SyncError> {
        self.record(RemoteCall::CreateCategory {
            name: category.name.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await?;
        let mut stored = category.clone();
        stored.id = Some(self.assign_id());
        Ok(stored)
    }

    async fn update_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Category, SyncError> {
        self.record(RemoteCall::UpdateCategory {
            id: category.id,
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await?;
        Ok(category.clone())
    }

    async fn delete_category(
        &self,
        id: i64,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<(), SyncError> {
        self.record(RemoteCall::DeleteCategory {
            id,
            idempotency_key: idempotency_key.map(str::to_string),
        })
        .await
    }
}

/// Cache keyed by `(user_id, kind)`, preserving insertion order.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<Vec<(i64, EntityKind, CacheEntry)>>,
}

impl InMemoryCache {
    pub fn len(&self, user_id: i64, kind: EntityKind) -> usize {
        self.entries.lock().iter().filter(|(user, k, _)| *user == user_id && *k == kind).count()
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn put(&self, user_id: i64, kind: EntityKind, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        match entries
            .iter_mut()
            .find(|(user, k, existing)| *user == user_id && *k == kind && existing.cache_key == entry.cache_key)
        {
            Some((_, _, existing)) => *existing = entry,
            None => entries.push((user_id, kind, entry)),
        }
        Ok(())
    }

    async fn remove(&self, user_id: i64, kind: EntityKind, cache_key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(user, k, entry)| !(*user == user_id && *k == kind && entry.cache_key == cache_key));
        Ok(entries.len() != before)
    }

    async fn list(&self, user_id: i64, kind: EntityKind) -> Result<Vec<CacheEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(user, k, _)| *user == user_id && *k == kind)
            .map(|(_, _, entry)| entry.clone())
            .collect())
    }

    async fn replace_all(&self, user_id: i64, kind: EntityKind, fresh: Vec<CacheEntry>) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.retain(|(user, k, _)| !(*user == user_id && *k == kind));
        entries.extend(fresh.into_iter().map(|entry| (user_id, kind, entry)));
        Ok(())
    }

    async fn clear_user(&self, user_id: i64) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(user, _, _)| *user != user_id);
        Ok(before - entries.len())
    }
}

/// Probe whose answer is flipped by the test.
pub struct TogglingProbe {
    reachable: AtomicBool,
}

impl TogglingProbe {
    pub fn new(reachable: bool) -> Self {
        Self { reachable: AtomicBool::new(reachable) }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for TogglingProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
