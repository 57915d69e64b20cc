//! Local ledger cache repository implementation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fintrack_core::finance::ports::{CacheEntry, LocalCache as LocalCachePort};
use fintrack_domain::{EntityKind, Result as DomainResult};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-based per-user ledger cache
pub struct SqliteLocalCache {
    db: Arc<DbManager>,
}

impl SqliteLocalCache {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocalCachePort for SqliteLocalCache {
    async fn put(&self, user_id: i64, kind: EntityKind, entry: CacheEntry) -> DomainResult<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            upsert_entry(&conn, user_id, kind, &entry).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove(&self, user_id: i64, kind: EntityKind, cache_key: &str) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let cache_key = cache_key.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            let affected = conn
                .execute(
                    "DELETE FROM local_cache WHERE user_id = ?1 AND entity_kind = ?2 AND cache_key = ?3",
                    params![user_id, kind.to_string(), cache_key],
                )
                .map_err(map_sql_error)?;
            Ok(affected > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list(&self, user_id: i64, kind: EntityKind) -> DomainResult<Vec<CacheEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<CacheEntry>> {
            let conn = db.get_connection()?;
            query_entries(&conn, user_id, kind).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn replace_all(
        &self,
        user_id: i64,
        kind: EntityKind,
        entries: Vec<CacheEntry>,
    ) -> DomainResult<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<()> {
            let mut conn = db.get_connection()?;
            replace_entries(&mut conn, user_id, kind, &entries).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn clear_user(&self, user_id: i64) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM local_cache WHERE user_id = ?1", params![user_id])
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

fn upsert_entry(
    conn: &Connection,
    user_id: i64,
    kind: EntityKind,
    entry: &CacheEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO local_cache (user_id, entity_kind, cache_key, payload_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, entity_kind, cache_key)
         DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at",
        params![
            user_id,
            kind.to_string(),
            entry.cache_key,
            entry.payload_json,
            Utc::now().timestamp_millis()
        ],
    )?;
    Ok(())
}

fn query_entries(
    conn: &Connection,
    user_id: i64,
    kind: EntityKind,
) -> rusqlite::Result<Vec<CacheEntry>> {
    let mut stmt = conn.prepare(
        "SELECT cache_key, payload_json FROM local_cache
         WHERE user_id = ?1 AND entity_kind = ?2
         ORDER BY cache_key ASC",
    )?;
    let rows = stmt.query_map(params![user_id, kind.to_string()], map_cache_row)?;
    rows.collect()
}

fn replace_entries(
    conn: &mut Connection,
    user_id: i64,
    kind: EntityKind,
    entries: &[CacheEntry],
) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "DELETE FROM local_cache WHERE user_id = ?1 AND entity_kind = ?2",
        params![user_id, kind.to_string()],
    )?;
    for entry in entries {
        upsert_entry(&tx, user_id, kind, entry)?;
    }
    tx.commit()
}

fn map_cache_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry { cache_key: row.get(0)?, payload_json: row.get(1)? })
}
