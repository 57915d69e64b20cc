use std::sync::Arc;
use std::time::Duration;

use fintrack_infra::database::{DbManager, SqliteDeadLetterLog, SqliteLocalCache, SqliteOperationQueue};
use fintrack_infra::remote::{ApiClient, ApiClientConfig, ClientSession};
use tempfile::TempDir;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    pub fn queue(&self) -> Arc<SqliteOperationQueue> {
        Arc::new(SqliteOperationQueue::new(Arc::clone(&self.manager)))
    }

    pub fn dead_letters(&self) -> Arc<SqliteDeadLetterLog> {
        Arc::new(SqliteDeadLetterLog::new(Arc::clone(&self.manager)))
    }

    pub fn cache(&self) -> Arc<SqliteLocalCache> {
        Arc::new(SqliteLocalCache::new(Arc::clone(&self.manager)))
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// API client pointed at a mock server's `/api` prefix.
pub fn api_client(server_uri: &str) -> Arc<ApiClient> {
    Arc::new(
        ApiClient::new(ApiClientConfig {
            base_url: format!("{server_uri}/api"),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_millis(500),
            max_attempts: 1,
        })
        .expect("api client should build"),
    )
}

/// API client already holding a session for `user_id`.
pub fn signed_in_client(server_uri: &str, user_id: i64) -> Arc<ApiClient> {
    let client = api_client(server_uri);
    client.restore_session(Some(ClientSession { token: format!("t-{user_id}"), user_id }));
    client
}
