//! Connectivity monitoring

pub mod monitor;
pub mod ports;

pub use monitor::{ConnectivityMonitor, ConnectivityMonitorConfig, SubscriptionId};
pub use ports::ReachabilityProbe;
