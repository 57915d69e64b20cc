//! # FinTrack Core
//!
//! Offline-first sync logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Connectivity monitor with edge-triggered listeners
//! - Operation queue front-end and replay engine
//! - Session registry and its periodic sweeper
//! - Online/offline router for ledger calls
//! - Port interfaces (traits) implemented by `fintrack-infra`
//!
//! ## Architecture Principles
//! - Only depends on `fintrack-common` and `fintrack-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod connectivity;
pub mod dispatch;
pub mod finance;
pub mod lifecycle;
pub mod session;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use connectivity::{ConnectivityMonitor, ConnectivityMonitorConfig, ReachabilityProbe};
pub use dispatch::{ChannelDispatcher, DeliveryContext, Dispatch, DispatchQueue};
pub use finance::{CacheEntry, ExpenseService, LocalCache};
pub use lifecycle::{LifecycleError, LifecycleResult};
pub use session::{ExpiringStore, SessionRegistry, SessionSweeper, SessionSweeperConfig};
pub use sync::{
    DeadLetterLog, FailureClass, OperationQueue, RemoteClient, ReplayReport, SyncEngine,
    SyncEngineConfig, SyncError,
};
