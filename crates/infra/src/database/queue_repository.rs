//! Operation queue repository implementation
//!
//! Durable FIFO of mutations recorded while the remote was unreachable. Each
//! row carries the id of the user who queued it.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fintrack_core::sync::ports::OperationQueue as OperationQueuePort;
use fintrack_domain::{NewOperation, QueuedOperation, Result as DomainResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-based operation queue
pub struct SqliteOperationQueue {
    db: Arc<DbManager>,
}

impl SqliteOperationQueue {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OperationQueuePort for SqliteOperationQueue {
    async fn enqueue(&self, operation: NewOperation) -> DomainResult<QueuedOperation> {
        let db = Arc::clone(&self.db);

        let queued = task::spawn_blocking(move || -> DomainResult<QueuedOperation> {
            let conn = db.get_connection()?;
            insert_operation(&conn, operation).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)??;

        debug!(
            operation_id = queued.id,
            user_id = queued.user_id,
            operation_kind = %queued.operation_kind,
            entity_kind = %queued.entity_kind,
            "operation enqueued"
        );
        Ok(queued)
    }

    async fn pending(&self) -> DomainResult<Vec<QueuedOperation>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<QueuedOperation>> {
            let conn = db.get_connection()?;
            query_pending(&conn, None).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_for(&self, user_id: i64) -> DomainResult<Vec<QueuedOperation>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<QueuedOperation>> {
            let conn = db.get_connection()?;
            query_pending(&conn, Some(user_id)).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn increment_retry(&self, id: i64) -> DomainResult<u32> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<u32> {
            let conn = db.get_connection()?;
            bump_retry_count(&conn, id).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove(&self, id: i64) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            let affected = conn
                .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(affected > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn count(&self) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sync_queue", params![], |row| row.get(0))
                .map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const QUEUE_COLUMNS: &str = "id, user_id, idempotency_key, operation_kind, entity_kind, payload_json,
     enqueued_at, retry_count";

fn insert_operation(conn: &Connection, operation: NewOperation) -> rusqlite::Result<QueuedOperation> {
    let idempotency_key = Uuid::new_v4().to_string();
    let enqueued_at = Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO sync_queue (user_id, idempotency_key, operation_kind, entity_kind,
                                 payload_json, enqueued_at, retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            operation.user_id,
            idempotency_key,
            operation.operation_kind.to_string(),
            operation.entity_kind.to_string(),
            operation.payload_json,
            enqueued_at
        ],
    )?;

    Ok(QueuedOperation {
        id: conn.last_insert_rowid(),
        user_id: operation.user_id,
        idempotency_key,
        operation_kind: operation.operation_kind,
        entity_kind: operation.entity_kind,
        payload_json: operation.payload_json,
        enqueued_at,
        retry_count: 0,
    })
}

fn query_pending(conn: &Connection, user_id: Option<i64>) -> rusqlite::Result<Vec<QueuedOperation>> {
    let sql = format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue
         WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY enqueued_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], map_queued_operation_row)?;
    rows.collect()
}

fn bump_retry_count(conn: &Connection, id: i64) -> rusqlite::Result<u32> {
    conn.query_row(
        "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?1 RETURNING retry_count",
        params![id],
        |row| row.get(0),
    )
}

pub(crate) fn query_operation(conn: &Connection, id: i64) -> rusqlite::Result<QueuedOperation> {
    let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1");
    conn.query_row(&sql, params![id], map_queued_operation_row)
}

pub(crate) fn map_queued_operation_row(row: &Row<'_>) -> rusqlite::Result<QueuedOperation> {
    Ok(QueuedOperation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        idempotency_key: row.get(2)?,
        operation_kind: parse_column(row, 3)?,
        entity_kind: parse_column(row, 4)?,
        payload_json: row.get(5)?,
        enqueued_at: row.get(6)?,
        retry_count: row.get(7)?,
    })
}

/// Read a text column through the type's `FromStr`.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        )
    })
}

#[cfg(test)]
mod tests {
    use fintrack_domain::{EntityKind, FinTrackError, OperationKind};
    use tempfile::TempDir;

    use super::*;

    async fn setup_queue() -> (SqliteOperationQueue, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("queue.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let queue = SqliteOperationQueue::new(manager.clone());
        (queue, manager, temp_dir)
    }

    fn new_operation(kind: OperationKind, payload: &str) -> NewOperation {
        owned_operation(1, kind, payload)
    }

    fn owned_operation(user_id: i64, kind: OperationKind, payload: &str) -> NewOperation {
        NewOperation {
            user_id,
            operation_kind: kind,
            entity_kind: EntityKind::Transaction,
            payload_json: payload.to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_assigns_key_and_timestamp() {
        let (queue, _db, _dir) = setup_queue().await;

        let before = Utc::now().timestamp_millis();
        let op = queue.enqueue(new_operation(OperationKind::Insert, r#"{"a":1}"#)).await.unwrap();

        assert!(op.id > 0);
        assert_eq!(op.retry_count, 0);
        assert!(op.enqueued_at >= before);
        assert!(Uuid::parse_str(&op.idempotency_key).is_ok());
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_is_fifo_and_ties_break_on_id() {
        let (queue, db, _dir) = setup_queue().await;

        let first = queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();
        let second = queue.enqueue(new_operation(OperationKind::Update, "{}")).await.unwrap();
        let third = queue.enqueue(new_operation(OperationKind::Delete, "{}")).await.unwrap();

        // Force identical timestamps so only the id decides
        {
            let conn = db.get_connection().unwrap();
            conn.execute("UPDATE sync_queue SET enqueued_at = 1000", []).unwrap();
        }

        let pending = queue.pending().await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(pending[1].operation_kind, OperationKind::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keys_are_unique_per_operation() {
        let (queue, _db, _dir) = setup_queue().await;

        let a = queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();
        let b = queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();

        assert_ne!(a.idempotency_key, b.idempotency_key);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn increment_retry_returns_new_count() {
        let (queue, _db, _dir) = setup_queue().await;
        let op = queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();

        assert_eq!(queue.increment_retry(op.id).await.unwrap(), 1);
        assert_eq!(queue.increment_retry(op.id).await.unwrap(), 2);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn increment_retry_on_missing_row_is_not_found() {
        let (queue, _db, _dir) = setup_queue().await;

        let err = queue.increment_retry(999).await.unwrap_err();
        assert!(matches!(err, FinTrackError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_deletes_once() {
        let (queue, _db, _dir) = setup_queue().await;
        let op = queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();
        queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();

        assert!(queue.remove(op.id).await.unwrap());
        assert!(!queue.remove(op.id).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_for_filters_by_owner_and_keeps_order() {
        let (queue, _db, _dir) = setup_queue().await;
        let a1 = queue.enqueue(owned_operation(1, OperationKind::Insert, "{}")).await.unwrap();
        let b1 = queue.enqueue(owned_operation(2, OperationKind::Insert, "{}")).await.unwrap();
        let a2 = queue.enqueue(owned_operation(1, OperationKind::Delete, "{}")).await.unwrap();

        let alice: Vec<i64> = queue.pending_for(1).await.unwrap().iter().map(|op| op.id).collect();
        assert_eq!(alice, vec![a1.id, a2.id]);

        let bob = queue.pending_for(2).await.unwrap();
        assert_eq!(bob, vec![b1]);
        assert!(queue.pending_for(3).await.unwrap().is_empty());
        assert_eq!(queue.pending().await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_survives_reopen() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("durable.db");

        {
            let manager = Arc::new(DbManager::new(&db_path, 2).unwrap());
            manager.run_migrations().unwrap();
            let queue = SqliteOperationQueue::new(manager);
            queue.enqueue(new_operation(OperationKind::Insert, r#"{"x":1}"#)).await.unwrap();
        }

        let manager = Arc::new(DbManager::new(&db_path, 2).unwrap());
        manager.run_migrations().unwrap();
        let queue = SqliteOperationQueue::new(manager);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload_json, r#"{"x":1}"#);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_kind_column_surfaces_as_database_error() {
        let (queue, db, _dir) = setup_queue().await;
        queue.enqueue(new_operation(OperationKind::Insert, "{}")).await.unwrap();
        {
            let conn = db.get_connection().unwrap();
            conn.execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 UPDATE sync_queue SET operation_kind = 'upsert';",
            )
            .unwrap();
        }

        let err = queue.pending().await.unwrap_err();
        assert!(matches!(err, FinTrackError::Database(_)));
    }
}
