//! Port interfaces for connectivity probing

use async_trait::async_trait;

/// Cheap liveness check against the remote server.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns `true` if the server answered; never errors.
    async fn is_reachable(&self) -> bool;
}
