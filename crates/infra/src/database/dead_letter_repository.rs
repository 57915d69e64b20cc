//! Dead-letter log repository implementation
//!
//! Operations are moved between `sync_queue` and `dead_letters` inside a
//! single SQLite transaction, so an entry is never in both tables or in
//! neither.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fintrack_core::sync::ports::DeadLetterLog as DeadLetterLogPort;
use fintrack_domain::{DeadLetter, DeadLetterReason, QueuedOperation, Result as DomainResult};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use tokio::task;
use tracing::{info, warn};

use super::manager::{map_join_error, map_sql_error, DbManager};
use super::queue_repository::{parse_column, query_operation};

/// SQLite-based dead-letter log
pub struct SqliteDeadLetterLog {
    db: Arc<DbManager>,
}

impl SqliteDeadLetterLog {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeadLetterLogPort for SqliteDeadLetterLog {
    async fn move_to_dead_letter(
        &self,
        operation: &QueuedOperation,
        reason: DeadLetterReason,
        last_error: &str,
    ) -> DomainResult<DeadLetter> {
        let db = Arc::clone(&self.db);
        let operation_id = operation.id;
        let last_error = last_error.to_string();

        let dead_letter = task::spawn_blocking(move || -> DomainResult<DeadLetter> {
            let mut conn = db.get_connection()?;
            move_operation(&mut conn, operation_id, reason, &last_error).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)??;

        warn!(
            operation_id = dead_letter.operation_id,
            reason = %dead_letter.reason,
            retry_count = dead_letter.retry_count,
            "operation dead-lettered"
        );
        Ok(dead_letter)
    }

    async fn list(&self) -> DomainResult<Vec<DeadLetter>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<DeadLetter>> {
            let conn = db.get_connection()?;
            query_dead_letters(&conn).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn count(&self) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM dead_letters", params![], |row| row.get(0))
                .map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn requeue(&self, dead_letter_id: i64) -> DomainResult<QueuedOperation> {
        let db = Arc::clone(&self.db);

        let queued = task::spawn_blocking(move || -> DomainResult<QueuedOperation> {
            let mut conn = db.get_connection()?;
            requeue_dead_letter(&mut conn, dead_letter_id).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)??;

        info!(dead_letter_id, operation_id = queued.id, "dead letter requeued");
        Ok(queued)
    }

    async fn purge(&self) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM dead_letters", params![]).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const DEAD_LETTER_COLUMNS: &str = "id, operation_id, user_id, idempotency_key, operation_kind,
     entity_kind, payload_json, enqueued_at, retry_count, reason, last_error, failed_at";

fn move_operation(
    conn: &mut Connection,
    operation_id: i64,
    reason: DeadLetterReason,
    last_error: &str,
) -> rusqlite::Result<DeadLetter> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let failed_at = Utc::now().timestamp_millis();

    // Stored row wins over the caller's copy so retry_count is the durable one
    let operation = query_operation(&tx, operation_id)?;

    tx.execute(
        "INSERT INTO dead_letters (operation_id, user_id, idempotency_key, operation_kind,
                                   entity_kind, payload_json, enqueued_at, retry_count, reason,
                                   last_error, failed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            operation.id,
            operation.user_id,
            operation.idempotency_key,
            operation.operation_kind.to_string(),
            operation.entity_kind.to_string(),
            operation.payload_json,
            operation.enqueued_at,
            operation.retry_count,
            reason.to_string(),
            last_error,
            failed_at
        ],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute("DELETE FROM sync_queue WHERE id = ?1", params![operation_id])?;
    tx.commit()?;

    Ok(DeadLetter {
        id,
        operation_id: operation.id,
        user_id: operation.user_id,
        idempotency_key: operation.idempotency_key,
        operation_kind: operation.operation_kind,
        entity_kind: operation.entity_kind,
        payload_json: operation.payload_json,
        enqueued_at: operation.enqueued_at,
        retry_count: operation.retry_count,
        reason,
        last_error: last_error.to_string(),
        failed_at,
    })
}

fn query_dead_letters(conn: &Connection) -> rusqlite::Result<Vec<DeadLetter>> {
    let sql =
        format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters ORDER BY failed_at ASC, id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![], map_dead_letter_row)?;
    rows.collect()
}

fn requeue_dead_letter(conn: &mut Connection, dead_letter_id: i64) -> rusqlite::Result<QueuedOperation> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let sql = format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE id = ?1");
    let dead_letter = tx.query_row(&sql, params![dead_letter_id], map_dead_letter_row)?;

    // A requeued entry goes to the back of its owner's line with a fresh
    // budget. The key is kept so the server can still recognise an earlier
    // delivery.
    let enqueued_at = Utc::now().timestamp_millis();
    let idempotency_key = dead_letter.idempotency_key;

    tx.execute(
        "INSERT INTO sync_queue (user_id, idempotency_key, operation_kind, entity_kind,
                                 payload_json, enqueued_at, retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            dead_letter.user_id,
            idempotency_key,
            dead_letter.operation_kind.to_string(),
            dead_letter.entity_kind.to_string(),
            dead_letter.payload_json,
            enqueued_at
        ],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute("DELETE FROM dead_letters WHERE id = ?1", params![dead_letter_id])?;
    tx.commit()?;

    Ok(QueuedOperation {
        id,
        user_id: dead_letter.user_id,
        idempotency_key,
        operation_kind: dead_letter.operation_kind,
        entity_kind: dead_letter.entity_kind,
        payload_json: dead_letter.payload_json,
        enqueued_at,
        retry_count: 0,
    })
}

fn map_dead_letter_row(row: &Row<'_>) -> rusqlite::Result<DeadLetter> {
    Ok(DeadLetter {
        id: row.get(0)?,
        operation_id: row.get(1)?,
        user_id: row.get(2)?,
        idempotency_key: row.get(3)?,
        operation_kind: parse_column(row, 4)?,
        entity_kind: parse_column(row, 5)?,
        payload_json: row.get(6)?,
        enqueued_at: row.get(7)?,
        retry_count: row.get(8)?,
        reason: parse_column(row, 9)?,
        last_error: row.get(10)?,
        failed_at: row.get(11)?,
    })
}
