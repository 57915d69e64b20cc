//! Database implementations

pub mod cache_repository;
pub mod dead_letter_repository;
pub mod manager;
pub mod queue_repository;

pub use cache_repository::SqliteLocalCache;
pub use dead_letter_repository::SqliteDeadLetterLog;
pub use manager::DbManager;
pub use queue_repository::SqliteOperationQueue;
