//! Offline operation queue and replay

pub mod engine;
pub mod errors;
pub mod ports;

pub use engine::{ReplayReport, SyncEngine, SyncEngineConfig};
pub use errors::{FailureClass, SyncError, SyncErrorCategory};
pub use ports::{DeadLetterLog, OperationQueue, RemoteClient};
