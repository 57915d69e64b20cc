//! Port interfaces for the client-side ledger cache

use async_trait::async_trait;
use fintrack_domain::{EntityKind, Result};

/// One cached entity snapshot.
///
/// `cache_key` is `id:<server id>` for entities the server has seen and
/// `local:<uuid>` for ones created offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload_json: String,
}

impl CacheEntry {
    pub fn for_id(id: i64, payload_json: String) -> Self {
        Self { cache_key: format!("id:{id}"), payload_json }
    }

    pub fn local(payload_json: String) -> Self {
        Self { cache_key: format!("local:{}", uuid::Uuid::new_v4()), payload_json }
    }
}

/// Per-user mirror of remote state, readable while offline
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Insert or overwrite a single entry
    async fn put(&self, user_id: i64, kind: EntityKind, entry: CacheEntry) -> Result<()>;

    async fn remove(&self, user_id: i64, kind: EntityKind, cache_key: &str) -> Result<bool>;

    async fn list(&self, user_id: i64, kind: EntityKind) -> Result<Vec<CacheEntry>>;

    /// Swap the whole set for `kind` with a fresh remote listing
    async fn replace_all(&self, user_id: i64, kind: EntityKind, entries: Vec<CacheEntry>)
        -> Result<()>;

    /// Forget everything cached for `user_id`
    async fn clear_user(&self, user_id: i64) -> Result<usize>;
}
