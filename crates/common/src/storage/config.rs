//! Connection pool configuration

use std::time::Duration;

use super::error::{StorageError, StorageResult};

/// r2d2 pool settings plus the pragmas applied to each connection.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,

    /// How long `get()` waits for a free connection
    pub connection_timeout: Duration,

    /// Busy timeout for SQLite lock contention
    pub busy_timeout: Duration,

    /// Enable WAL journal mode
    pub enable_wal: bool,

    /// Enable foreign key constraints
    pub enable_foreign_keys: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl PoolConfig {
    /// Set the connection pool size
    pub fn with_max_size(mut self, size: u32) -> Self {
        self.max_size = size;
        self
    }

    /// Ensure the values are within acceptable ranges.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidConfig`] for a zero or oversized pool
    /// and for zero timeouts.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_size == 0 {
            return Err(StorageError::InvalidConfig("max_size must be greater than 0".into()));
        }
        if self.max_size > 100 {
            return Err(StorageError::InvalidConfig("max_size too large (max: 100)".into()));
        }
        if self.connection_timeout.is_zero() {
            return Err(StorageError::InvalidConfig(
                "connection_timeout must be greater than 0".into(),
            ));
        }
        if self.busy_timeout.is_zero() {
            return Err(StorageError::InvalidConfig("busy_timeout must be greater than 0".into()));
        }
        Ok(())
    }
}
