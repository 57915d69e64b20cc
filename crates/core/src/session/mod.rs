//! Server-side session tokens

pub mod registry;
pub mod sweeper;

pub use registry::SessionRegistry;
pub use sweeper::{ExpiringStore, SessionSweeper, SessionSweeperConfig};
