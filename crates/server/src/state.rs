//! Shared handler state - dependency injection container

use std::sync::Arc;

use fintrack_core::SessionRegistry;
use fintrack_domain::Config;

use crate::stores::{IdempotencyStore, LedgerStore, UserStore};

/// Services shared by every handler through axum `State`.
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub users: Arc<UserStore>,
    pub ledger: Arc<LedgerStore>,
    pub idempotency: Arc<IdempotencyStore>,
}

impl AppState {
    /// Empty stores around an existing session registry.
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            users: Arc::new(UserStore::new()),
            ledger: Arc::new(LedgerStore::new()),
            idempotency: Arc::new(IdempotencyStore::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            idempotency: Arc::new(IdempotencyStore::new(config.server.idempotency_ttl())),
            ..Self::new(Arc::new(SessionRegistry::from_config(&config.session)))
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(SessionRegistry::default()))
    }
}
