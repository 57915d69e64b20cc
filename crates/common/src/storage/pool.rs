//! r2d2-based SQLite connection pool

use std::path::{Path, PathBuf};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::PoolConfig;
use super::error::{StorageError, StorageResult};
use super::pragmas::apply_connection_pragmas;

/// Pooled connection handed out by [`SqlitePool`]. Derefs to
/// `rusqlite::Connection` and returns to the pool on drop.
pub type PooledSqlite = PooledConnection<SqliteConnectionManager>;

/// SQLite connection pool with pragmas applied on connect.
#[derive(Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: PoolConfig,
    path: PathBuf,
}

impl SqlitePool {
    /// Open (or create) the database at `path` and build the pool.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidConfig`] for invalid settings and
    /// [`StorageError::R2d2`] when the initial connections cannot be opened.
    pub fn new(path: impl AsRef<Path>, config: PoolConfig) -> StorageResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let init_config = config.clone();
        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| apply_connection_pragmas(conn, &init_config));

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        info!(
            db_path = %path.display(),
            max_connections = config.max_size,
            "sqlite pool created"
        );

        Ok(Self { pool, config, path })
    }

    /// Acquire a connection, waiting up to the configured timeout.
    #[instrument(skip(self), fields(pool_size = self.config.max_size))]
    pub fn get(&self) -> StorageResult<PooledSqlite> {
        match self.pool.get() {
            Ok(conn) => {
                debug!("connection acquired");
                Ok(conn)
            }
            Err(err) => {
                let message = err.to_string();
                if message.to_lowercase().contains("timed out") {
                    warn!(timeout = ?self.config.connection_timeout, "connection timeout");
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    warn!(error = %message, "connection error");
                    Err(StorageError::Connection(message))
                }
            }
        }
    }

    /// Database file backing this pool.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured maximum pool size.
    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }
}
