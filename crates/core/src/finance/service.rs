//! Online/offline router for ledger mutations and reads.
//!
//! When the monitor reports `Online` the service talks to the remote and
//! mirrors results into the local cache. When offline, or when a remote call
//! fails, the mutation is queued for replay and then applied to the cache. A
//! connectivity listener triggers a replay on every transition to `Online`.
//! Queued work is owned by the user who made it and survives logout; it
//! replays the next time that user signs in.

use std::sync::Arc;

use fintrack_domain::{
    Category, ConnectionState, Credentials, EntityKind, FinTrackError, NewOperation,
    OperationKind, RegisterRequest, RegisterResponse, Result, SessionIdentity, Transaction,
    TransactionFilter,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::ports::{CacheEntry, LocalCache};
use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::sync::{RemoteClient, SyncEngine, SyncError};

/// Routes each ledger call to the remote or to the offline path.
pub struct ExpenseService {
    remote: Arc<dyn RemoteClient>,
    cache: Arc<dyn LocalCache>,
    engine: SyncEngine,
    monitor: Arc<ConnectivityMonitor>,
    current_user: RwLock<Option<SessionIdentity>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl ExpenseService {
    /// Create the router and register its replay trigger on `monitor`.
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        cache: Arc<dyn LocalCache>,
        engine: SyncEngine,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let trigger = engine.clone();
        let subscription = monitor.subscribe(move |state| {
            if state.is_online() {
                debug!("Connectivity restored; triggering replay");
                trigger.replay();
            }
        });

        Self {
            remote,
            cache,
            engine,
            monitor,
            current_user: RwLock::new(None),
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.current_state()
    }

    pub fn current_user(&self) -> Option<SessionIdentity> {
        self.current_user.read().clone()
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionIdentity> {
        let response = self.remote.login(credentials).await.map_err(FinTrackError::from)?;
        let identity =
            SessionIdentity { user_id: response.user_id, username: response.user.username.clone() };
        *self.current_user.write() = Some(identity.clone());
        info!(user_id = identity.user_id, "Logged in");

        // Resume anything a previous pass deferred on 401.
        self.engine.replay();
        Ok(identity)
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.remote.register(request).await.map_err(FinTrackError::from)
    }

    /// Revoke remotely (best effort) and forget the user. Their queued work
    /// stays parked for their next login.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.remote.logout().await {
            warn!(error = %e, "Remote logout failed; clearing local session anyway");
        }
        let previous = self.current_user.write().take();
        if let Some(user) = previous {
            if let Err(e) = self.cache.clear_user(user.user_id).await {
                warn!(error = %e, "Failed to clear local cache on logout");
            }
            info!(user_id = user.user_id, "Logged out");
        }
        Ok(())
    }

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.list_transactions(filter).await {
                Ok(transactions) => {
                    if filter.is_empty() {
                        self.mirror_all(user.user_id, EntityKind::Transaction, &transactions, Transaction::id)
                            .await;
                    }
                    return Ok(transactions);
                }
                Err(e) => warn!(error = %e, "Remote listing failed; serving cached transactions"),
            }
        }

        let cached: Vec<Transaction> = self.cached(user.user_id, EntityKind::Transaction).await?;
        Ok(cached.into_iter().filter(|tx| filter.matches(tx)).collect())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.list_categories().await {
                Ok(categories) => {
                    self.mirror_all(user.user_id, EntityKind::Category, &categories, |c| c.id)
                        .await;
                    return Ok(categories);
                }
                Err(e) => warn!(error = %e, "Remote listing failed; serving cached categories"),
            }
        }

        self.cached(user.user_id, EntityKind::Category).await
    }

    /// Returns the stored entity when the remote accepted it, or the input
    /// unchanged when it was queued.
    #[instrument(skip(self, transaction))]
    pub async fn add_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        transaction.validate()?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.create_transaction(transaction, None).await {
                Ok(stored) => {
                    self.mirror(user.user_id, EntityKind::Transaction, &stored, stored.id()).await;
                    return Ok(stored);
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Transaction, OperationKind::Insert, transaction, None)
            .await?;
        Ok(transaction.clone())
    }

    #[instrument(skip(self, transaction))]
    pub async fn update_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        transaction.validate()?;
        let id = require_id(transaction.id(), "transaction")?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.update_transaction(transaction, None).await {
                Ok(stored) => {
                    self.mirror(user.user_id, EntityKind::Transaction, &stored, Some(id)).await;
                    return Ok(stored);
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Transaction, OperationKind::Update, transaction, Some(id))
            .await?;
        Ok(transaction.clone())
    }

    #[instrument(skip(self, transaction))]
    pub async fn delete_transaction(&self, transaction: &Transaction) -> Result<()> {
        let id = require_id(transaction.id(), "transaction")?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.delete_transaction(id, None).await {
                Ok(()) => {
                    self.forget(user.user_id, EntityKind::Transaction, id).await;
                    return Ok(());
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Transaction, OperationKind::Delete, transaction, Some(id))
            .await
    }

    #[instrument(skip(self, category))]
    pub async fn add_category(&self, category: &Category) -> Result<Category> {
        category.validate()?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.create_category(category, None).await {
                Ok(stored) => {
                    self.mirror(user.user_id, EntityKind::Category, &stored, stored.id).await;
                    return Ok(stored);
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Category, OperationKind::Insert, category, None)
            .await?;
        Ok(category.clone())
    }

    #[instrument(skip(self, category))]
    pub async fn update_category(&self, category: &Category) -> Result<Category> {
        category.validate()?;
        let id = require_id(category.id, "category")?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.update_category(category, None).await {
                Ok(stored) => {
                    self.mirror(user.user_id, EntityKind::Category, &stored, Some(id)).await;
                    return Ok(stored);
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Category, OperationKind::Update, category, Some(id))
            .await?;
        Ok(category.clone())
    }

    #[instrument(skip(self, category))]
    pub async fn delete_category(&self, category: &Category) -> Result<()> {
        let id = require_id(category.id, "category")?;
        let user = self.require_user()?;

        if self.is_online() {
            match self.remote.delete_category(id, None).await {
                Ok(()) => {
                    self.forget(user.user_id, EntityKind::Category, id).await;
                    return Ok(());
                }
                Err(e) => log_fallback(&e),
            }
        }

        self.queue_locally(user.user_id, EntityKind::Category, OperationKind::Delete, category, Some(id))
            .await
    }

    fn is_online(&self) -> bool {
        self.monitor.current_state().is_online()
    }

    fn require_user(&self) -> Result<SessionIdentity> {
        self.current_user
            .read()
            .clone()
            .ok_or_else(|| FinTrackError::Auth("not logged in".into()))
    }

    async fn queue_locally<T: Serialize + Sync>(
        &self,
        user_id: i64,
        kind: EntityKind,
        operation_kind: OperationKind,
        entity: &T,
        id: Option<i64>,
    ) -> Result<()> {
        let operation = NewOperation::from_entity(user_id, operation_kind, kind, entity)?;
        // The cache only shows what the queue has durably recorded.
        let queued = self.engine.enqueue(operation).await?;

        match (operation_kind, id) {
            (OperationKind::Delete, Some(id)) => self.forget(user_id, kind, id).await,
            (_, Some(id)) => {
                self.put_cached(user_id, kind, CacheEntry::for_id(id, queued.payload_json)).await;
            }
            (_, None) => {
                self.put_cached(user_id, kind, CacheEntry::local(queued.payload_json)).await;
            }
        }
        Ok(())
    }

    async fn cached<T: DeserializeOwned>(&self, user_id: i64, kind: EntityKind) -> Result<Vec<T>> {
        let entries = self.cache.list(user_id, kind).await?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_str(&entry.payload_json) {
                Ok(item) => items.push(item),
                Err(e) => warn!(cache_key = %entry.cache_key, error = %e, "Skipping unreadable cache entry"),
            }
        }
        Ok(items)
    }

    async fn mirror<T: Serialize + Sync>(&self, user_id: i64, kind: EntityKind, entity: &T, id: Option<i64>) {
        let payload_json = match serde_json::to_string(entity) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize entity for cache");
                return;
            }
        };
        let entry = match id {
            Some(id) => CacheEntry::for_id(id, payload_json),
            None => CacheEntry::local(payload_json),
        };
        self.put_cached(user_id, kind, entry).await;
    }

    async fn mirror_all<T, F>(&self, user_id: i64, kind: EntityKind, entities: &[T], id_of: F)
    where
        T: Serialize + Sync,
        F: Fn(&T) -> Option<i64> + Send + Sync,
    {
        let mut entries = Vec::with_capacity(entities.len());
        for entity in entities {
            match serde_json::to_string(entity) {
                Ok(json) => entries.push(match id_of(entity) {
                    Some(id) => CacheEntry::for_id(id, json),
                    None => CacheEntry::local(json),
                }),
                Err(e) => warn!(error = %e, "Failed to serialize entity for cache"),
            }
        }
        if let Err(e) = self.cache.replace_all(user_id, kind, entries).await {
            warn!(%kind, error = %e, "Failed to refresh local cache");
        }
    }

    async fn put_cached(&self, user_id: i64, kind: EntityKind, entry: CacheEntry) {
        if let Err(e) = self.cache.put(user_id, kind, entry).await {
            warn!(%kind, error = %e, "Failed to update local cache");
        }
    }

    async fn forget(&self, user_id: i64, kind: EntityKind, id: i64) {
        if let Err(e) = self.cache.remove(user_id, kind, &format!("id:{id}")).await {
            warn!(%kind, error = %e, "Failed to update local cache");
        }
    }
}

impl Drop for ExpenseService {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get_mut().take() {
            self.monitor.unsubscribe(id);
        }
    }
}

fn require_id(id: Option<i64>, entity: &str) -> Result<i64> {
    id.ok_or_else(|| FinTrackError::InvalidInput(format!("{entity} has no id yet")))
}

fn log_fallback(err: &SyncError) {
    warn!(error = %err, class = ?err.failure_class(), "Remote call failed; queueing for replay");
}
