//! Storage primitives for SQLite databases
//!
//! Provides an r2d2-backed connection pool with per-connection pragmas and
//! the storage error type shared by repository implementations.

pub mod config;
pub mod error;
pub mod pool;
pub mod pragmas;

// Re-export commonly used types
pub use config::PoolConfig;
pub use error::{StorageError, StorageResult};
pub use pool::{PooledSqlite, SqlitePool};
pub use pragmas::apply_connection_pragmas;
