//! Ledger routing between remote and offline paths

pub mod ports;
pub mod service;

pub use ports::{CacheEntry, LocalCache};
pub use service::ExpenseService;
