//! # FinTrack Server
//!
//! HTTP edge of the ledger service.
//!
//! This crate contains:
//! - The request gate that authenticates every non-public call
//! - Auth, transaction, category and health routes
//! - In-memory user, ledger and idempotency stores (`AppState`)
//! - The `fintrack-server` binary
//!
//! ## Architecture
//! - Depends on `domain`, `core` and `infra`
//! - Session tokens live in `fintrack_core::SessionRegistry`

pub mod error;
pub mod gate;
pub mod routes;
pub mod state;
pub mod stores;

#[cfg(test)]
mod test_support;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;
pub use gate::AuthUser;
pub use state::AppState;

/// Build the full application router with the gate applied.
pub fn router(state: AppState) -> Router {
    routes::router()
        .layer(axum::middleware::from_fn_with_state(state.clone(), gate::require_session))
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// # Errors
/// Returns the I/O error that stopped the accept loop.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "FinTrack server listening");
    }
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
