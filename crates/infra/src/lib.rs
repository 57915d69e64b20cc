//! # FinTrack Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite-backed operation queue, dead-letter log and ledger cache
//! - HTTP client with retry and the REST adapter for the remote API
//! - Configuration loading from environment and files
//!
//! ## Architecture
//! - Implements traits defined in `fintrack-core`
//! - Contains all "impure" code (I/O, network)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod remote;

// Re-export commonly used items
pub use database::{DbManager, SqliteDeadLetterLog, SqliteLocalCache, SqliteOperationQueue};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use remote::{ApiClient, ApiClientConfig, ClientSession};
