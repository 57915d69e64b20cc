//! In-memory bearer token registry with sliding expiration.
//!
//! Tokens are 128 random bits rendered as 32 hex characters. A token stays
//! valid while the time since its last successful validation does not exceed
//! the TTL; every successful validation resets that clock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fintrack_common::clock::{Clock, SystemClock};
use fintrack_domain::constants::{DEFAULT_SESSION_TTL_SECS, SESSION_TOKEN_BYTES};
use fintrack_domain::{SessionConfig, SessionIdentity, SessionToken};
use rand::RngCore;
use tracing::{debug, info};

/// Concurrent token store shared by every request handler.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionToken>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl())
    }

    /// Build a registry on an injected time source.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { sessions: DashMap::new(), ttl, clock }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create and store a token bound to `user_id`/`username`.
    pub fn issue(&self, user_id: i64, username: &str) -> SessionToken {
        loop {
            let token = generate_token();
            if let Entry::Vacant(slot) = self.sessions.entry(token.clone()) {
                let session = SessionToken {
                    token,
                    user_id,
                    username: username.to_string(),
                    last_accessed_at: self.clock.now(),
                };
                slot.insert(session.clone());
                info!(user_id, username, "Session issued");
                return session;
            }
        }
    }

    /// Check a token and extend its lifetime. Expired tokens are removed.
    pub fn validate(&self, token: &str) -> Option<SessionIdentity> {
        let now = self.clock.now();
        {
            let mut session = self.sessions.get_mut(token)?;
            if now.saturating_duration_since(session.last_accessed_at) <= self.ttl {
                session.last_accessed_at = now;
                return Some(session.identity());
            }
        }

        let removed = self.sessions.remove_if(token, |_, session| {
            now.saturating_duration_since(session.last_accessed_at) > self.ttl
        });
        if let Some((_, session)) = removed {
            debug!(user_id = session.user_id, "Session expired on validation");
        }
        None
    }

    /// Read the identity behind a live token without touching it.
    pub fn lookup(&self, token: &str) -> Option<SessionIdentity> {
        let now = self.clock.now();
        self.sessions
            .get(token)
            .filter(|session| now.saturating_duration_since(session.last_accessed_at) <= self.ttl)
            .map(|session| session.identity())
    }

    /// Remove a token. Returns `false` if it was unknown.
    pub fn revoke(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                info!(user_id = session.user_id, "Session revoked");
                true
            }
            None => false,
        }
    }

    /// Drop every token idle for longer than the TTL.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.saturating_duration_since(session.last_accessed_at) <= self.ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "Cleaned up expired sessions");
        }
        removed
    }

    /// Tokens currently stored, including ones not yet swept.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
