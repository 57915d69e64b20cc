//! # FinTrack Domain
//!
//! Business domain types and models for FinTrack.
//!
//! This crate contains:
//! - Ledger entities (`Transaction`, `Category`) and query filters
//! - Sync records (`QueuedOperation`, `DeadLetter`) and connectivity state
//! - Session identities
//! - Domain error types, configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other FinTrack crates
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
