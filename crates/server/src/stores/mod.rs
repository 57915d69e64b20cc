//! In-memory stores owned by the server process

pub mod idempotency;
pub mod ledger;
pub mod users;

pub use idempotency::{IdempotencyStore, StoredResponse};
pub use ledger::LedgerStore;
pub use users::{UserRecord, UserStore};
