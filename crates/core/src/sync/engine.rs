//! Operation queue front-end and replay engine.
//!
//! Mutations made while the remote is unavailable are enqueued durably and
//! replayed later in `(enqueued_at, id)` order. One pass runs at a time per
//! engine; a trigger that arrives mid-pass schedules exactly one follow-up.
//!
//! Failure handling per operation:
//! - transient errors bump `retry_count`; reaching `max_retries` moves the
//!   operation to the dead-letter log
//! - 401/403 stop the pass without touching the budget and raise the
//!   re-authentication signal
//! - rejected payloads are dead-lettered at once and the pass moves on
//!
//! Every operation belongs to the user who queued it. A pass only replays
//! operations owned by the user the remote is currently signed in as; the
//! rest stay parked until their owner signs in again.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fintrack_core::dispatch::DeliveryContext;
//! use fintrack_core::sync::{SyncEngine, SyncEngineConfig};
//!
//! # async fn example() -> fintrack_domain::Result<()> {
//! # let queue: Arc<dyn fintrack_core::OperationQueue> = todo!();
//! # let dead_letters: Arc<dyn fintrack_core::DeadLetterLog> = todo!();
//! # let remote: Arc<dyn fintrack_core::RemoteClient> = todo!();
//! let engine = SyncEngine::new(
//!     queue,
//!     dead_letters,
//!     remote,
//!     SyncEngineConfig::default(),
//!     DeliveryContext::Inline,
//! );
//! engine.on_replay_complete(|report| tracing::info!(?report, "Replay finished"));
//!
//! engine.replay();
//! engine.wait_idle().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use fintrack_domain::constants::{DEFAULT_MAX_RETRIES, MAX_ERROR_MESSAGE_LEN};
use fintrack_domain::{
    Category, DeadLetter, DeadLetterReason, EntityKind, EntityRef, NewOperation, OperationKind,
    QueuedOperation, Result, SyncConfig, Transaction,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::errors::{FailureClass, SyncError};
use super::ports::{DeadLetterLog, OperationQueue, RemoteClient};
use crate::dispatch::DeliveryContext;

/// Configuration for the replay engine.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Attempts allowed per operation before it is dead-lettered
    pub max_retries: u32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES }
    }
}

impl From<&SyncConfig> for SyncEngineConfig {
    fn from(config: &SyncConfig) -> Self {
        Self { max_retries: config.max_retries }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Remote calls issued (or payloads found undecodable)
    pub attempted: usize,
    pub succeeded: usize,
    /// Transient failures left in the queue with a higher retry count
    pub retried: usize,
    pub dead_lettered: usize,
    /// Operations left untouched because the pass stopped on 401/403
    pub deferred: usize,
    pub reauth_required: bool,
}

type ReportListener = Arc<dyn Fn(ReplayReport) + Send + Sync>;
type ReauthListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct ReplaySchedule {
    running: bool,
    rerun: bool,
}

struct EngineInner {
    queue: Arc<dyn OperationQueue>,
    dead_letters: Arc<dyn DeadLetterLog>,
    remote: Arc<dyn RemoteClient>,
    config: SyncEngineConfig,
    delivery: DeliveryContext,
    runtime: Option<Handle>,
    schedule: Mutex<ReplaySchedule>,
    pass_lock: tokio::sync::Mutex<()>,
    idle: watch::Sender<bool>,
    report_listeners: Mutex<Vec<ReportListener>>,
    reauth_listeners: Mutex<Vec<ReauthListener>>,
}

/// Durable queue plus serialized replay against the remote.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<dyn OperationQueue>,
        dead_letters: Arc<dyn DeadLetterLog>,
        remote: Arc<dyn RemoteClient>,
        config: SyncEngineConfig,
        delivery: DeliveryContext,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(EngineInner {
                queue,
                dead_letters,
                remote,
                config,
                delivery,
                runtime: Handle::try_current().ok(),
                schedule: Mutex::new(ReplaySchedule::default()),
                pass_lock: tokio::sync::Mutex::new(()),
                idle,
                report_listeners: Mutex::new(Vec::new()),
                reauth_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Durably record a mutation for later replay.
    ///
    /// # Errors
    /// Storage failures are returned unchanged; the mutation is not queued.
    #[instrument(skip(self, operation), fields(kind = %operation.operation_kind, entity = %operation.entity_kind))]
    pub async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation> {
        match self.inner.queue.enqueue(operation).await {
            Ok(queued) => {
                info!(operation_id = queued.id, "Operation queued for replay");
                Ok(queued)
            }
            Err(e) => {
                error!(error = %e, "Failed to queue operation; mutation not recorded");
                Err(e)
            }
        }
    }

    /// Trigger a replay pass in the background. Never blocks and never fails.
    pub fn replay(&self) {
        {
            let mut schedule = self.inner.schedule.lock();
            if schedule.running {
                schedule.rerun = true;
                debug!("Replay already in flight; scheduling a follow-up pass");
                return;
            }
            schedule.running = true;
        }

        let Some(runtime) = Handle::try_current().ok().or_else(|| self.inner.runtime.clone())
        else {
            warn!("No async runtime available; replay trigger ignored");
            self.inner.schedule.lock().running = false;
            return;
        };

        self.inner.idle.send_replace(false);
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            inner.drive().await;
        });
    }

    /// Run one pass on the calling task and return its report.
    pub async fn run_pass(&self) -> ReplayReport {
        self.inner.execute_pass().await
    }

    /// Resolves once no background or inline pass is running.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        if idle.wait_for(|is_idle| *is_idle).await.is_err() {
            return;
        }
        let _pass = self.inner.pass_lock.lock().await;
    }

    pub fn is_replaying(&self) -> bool {
        self.inner.schedule.lock().running
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.inner.queue.count().await
    }

    /// Pending operations of every user.
    pub async fn pending(&self) -> Result<Vec<QueuedOperation>> {
        self.inner.queue.pending().await
    }

    pub async fn pending_for(&self, user_id: i64) -> Result<Vec<QueuedOperation>> {
        self.inner.queue.pending_for(user_id).await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.inner.dead_letters.list().await
    }

    pub async fn dead_letter_count(&self) -> Result<usize> {
        self.inner.dead_letters.count().await
    }

    /// Put a dead letter back in the queue with a fresh retry budget.
    #[instrument(skip(self))]
    pub async fn requeue_dead_letter(&self, dead_letter_id: i64) -> Result<QueuedOperation> {
        let queued = self.inner.dead_letters.requeue(dead_letter_id).await?;
        info!(operation_id = queued.id, "Dead letter requeued");
        Ok(queued)
    }

    pub async fn purge_dead_letters(&self) -> Result<usize> {
        self.inner.dead_letters.purge().await
    }

    /// Called after every pass that attempted at least one operation.
    pub fn on_replay_complete<F>(&self, callback: F)
    where
        F: Fn(ReplayReport) + Send + Sync + 'static,
    {
        self.inner.report_listeners.lock().push(Arc::new(callback));
    }

    /// Called when a pass stops because the server refused the credentials.
    pub fn on_reauth_required<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.reauth_listeners.lock().push(Arc::new(callback));
    }
}

impl EngineInner {
    async fn drive(self: Arc<Self>) {
        loop {
            self.execute_pass().await;

            let mut schedule = self.schedule.lock();
            if schedule.rerun {
                schedule.rerun = false;
                debug!("Running follow-up replay pass");
                continue;
            }
            schedule.running = false;
            drop(schedule);
            self.idle.send_replace(true);
            break;
        }
    }

    #[instrument(skip(self))]
    async fn execute_pass(&self) -> ReplayReport {
        let _pass = self.pass_lock.lock().await;
        let mut report = ReplayReport::default();

        let Some(owner) = self.remote.session_user() else {
            debug!("No signed-in user; replay pass skipped");
            return report;
        };

        let operations = match self.queue.pending_for(owner).await {
            Ok(operations) => operations,
            Err(e) => {
                error!(error = %e, "Failed to load pending operations");
                return report;
            }
        };

        if operations.is_empty() {
            debug!("Replay pass found nothing to do");
            return report;
        }

        let total = operations.len();
        info!(user_id = owner, pending = total, "Starting replay pass");

        for (index, operation) in operations.iter().enumerate() {
            report.attempted += 1;

            let err = match self.dispatch(operation).await {
                Ok(()) => {
                    self.record_success(operation, &mut report).await;
                    continue;
                }
                Err(err) => err,
            };

            match err.failure_class() {
                FailureClass::Transient => {
                    self.record_transient_failure(operation, &err, &mut report).await;
                }
                FailureClass::Rejected => {
                    warn!(operation_id = operation.id, error = %err, "Server rejected queued operation");
                    self.dead_letter(operation, DeadLetterReason::Rejected, &err, &mut report).await;
                }
                FailureClass::Unauthorized => {
                    report.reauth_required = true;
                    report.deferred = total - index;
                    warn!(
                        operation_id = operation.id,
                        deferred = report.deferred,
                        "Replay stopped: re-authentication required"
                    );
                    break;
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            deferred = report.deferred,
            "Replay pass complete"
        );
        self.notify(report);
        report
    }

    async fn record_success(&self, operation: &QueuedOperation, report: &mut ReplayReport) {
        match self.queue.remove(operation.id).await {
            Ok(_) => {
                report.succeeded += 1;
                debug!(operation_id = operation.id, "Replayed operation");
            }
            Err(e) => {
                // The remote applied it; the idempotency key absorbs the resend.
                error!(operation_id = operation.id, error = %e, "Failed to remove replayed operation");
                report.succeeded += 1;
            }
        }
    }

    async fn record_transient_failure(
        &self,
        operation: &QueuedOperation,
        err: &SyncError,
        report: &mut ReplayReport,
    ) {
        let retry_count = match self.queue.increment_retry(operation.id).await {
            Ok(count) => count,
            Err(e) => {
                error!(operation_id = operation.id, error = %e, "Failed to record retry");
                return;
            }
        };

        if retry_count >= self.config.max_retries.max(1) {
            warn!(
                operation_id = operation.id,
                retry_count,
                error = %err,
                "Retry budget exhausted"
            );
            self.dead_letter(operation, DeadLetterReason::Exhausted, err, report).await;
        } else {
            debug!(operation_id = operation.id, retry_count, error = %err, "Replay failed; will retry");
            report.retried += 1;
        }
    }

    async fn dead_letter(
        &self,
        operation: &QueuedOperation,
        reason: DeadLetterReason,
        err: &SyncError,
        report: &mut ReplayReport,
    ) {
        let message = truncate_reason(&err.to_string());
        match self.dead_letters.move_to_dead_letter(operation, reason, &message).await {
            Ok(entry) => {
                report.dead_lettered += 1;
                info!(operation_id = operation.id, dead_letter_id = entry.id, %reason, "Operation dead-lettered");
            }
            Err(e) => {
                error!(operation_id = operation.id, error = %e, "Failed to dead-letter operation");
            }
        }
    }

    async fn dispatch(&self, operation: &QueuedOperation) -> std::result::Result<(), SyncError> {
        let key = Some(operation.idempotency_key.as_str());
        let remote = &self.remote;

        match (operation.entity_kind, operation.operation_kind) {
            (EntityKind::Transaction, OperationKind::Insert) => {
                let transaction: Transaction = decode(operation)?;
                remote.create_transaction(&transaction, key).await.map(drop)
            }
            (EntityKind::Transaction, OperationKind::Update) => {
                let transaction: Transaction = decode(operation)?;
                remote.update_transaction(&transaction, key).await.map(drop)
            }
            (EntityKind::Transaction, OperationKind::Delete) => {
                remote.delete_transaction(target_id(operation)?, key).await
            }
            (EntityKind::Category, OperationKind::Insert) => {
                let category: Category = decode(operation)?;
                remote.create_category(&category, key).await.map(drop)
            }
            (EntityKind::Category, OperationKind::Update) => {
                let category: Category = decode(operation)?;
                remote.update_category(&category, key).await.map(drop)
            }
            (EntityKind::Category, OperationKind::Delete) => {
                remote.delete_category(target_id(operation)?, key).await
            }
        }
    }

    fn notify(&self, report: ReplayReport) {
        if report.attempted == 0 {
            return;
        }

        let listeners: Vec<ReportListener> = self.report_listeners.lock().clone();
        for listener in listeners {
            self.delivery.deliver(move || listener(report));
        }

        if report.reauth_required {
            let listeners: Vec<ReauthListener> = self.reauth_listeners.lock().clone();
            for listener in listeners {
                self.delivery.deliver(move || listener());
            }
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &QueuedOperation) -> std::result::Result<T, SyncError> {
    operation
        .payload()
        .map_err(|e| SyncError::Client(format!("undecodable {} payload: {e}", operation.entity_kind)))
}

fn target_id(operation: &QueuedOperation) -> std::result::Result<i64, SyncError> {
    let entity: EntityRef = decode(operation)?;
    entity
        .id
        .ok_or_else(|| SyncError::Client(format!("{} payload has no id", operation.entity_kind)))
}

fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return reason.to_string();
    }
    reason.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}
