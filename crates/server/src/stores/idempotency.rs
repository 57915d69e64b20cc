//! Replay protection for mutations carrying an `Idempotency-Key`
//!
//! Recorded responses lapse after a TTL so the store stays bounded; a key
//! older than that is treated as new.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fintrack_common::clock::{Clock, SystemClock};
use fintrack_core::ExpiringStore;
use fintrack_domain::constants::DEFAULT_IDEMPOTENCY_TTL_SECS;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;

/// A successful mutation response kept for replays of the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Option<serde_json::Value>,
}

impl StoredResponse {
    /// # Errors
    /// [`ApiError::Internal`] if `value` cannot be serialized.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_value(value)
            .map_err(|e| ApiError::Internal(format!("failed to encode response: {e}")))?;
        Ok(Self { status, body: Some(body) })
    }

    pub const fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }
}

impl IntoResponse for StoredResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Responses indexed by `(user_id, key)`.
///
/// Only successful responses are recorded, so a request that failed may be
/// retried under the same key.
pub struct IdempotencyStore {
    entries: Mutex<HashMap<(i64, String), Recorded>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

struct Recorded {
    response: StoredResponse,
    at: Instant,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl, clock }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, user_id: i64, key: &str) -> Option<StoredResponse> {
        let now = self.clock.now();
        let stored = self
            .entries
            .lock()
            .get(&(user_id, key.to_string()))
            .filter(|recorded| now.saturating_duration_since(recorded.at) <= self.ttl)
            .map(|recorded| recorded.response.clone());
        if stored.is_some() {
            debug!(user_id, idempotency_key = key, "Answering repeated key from store");
        }
        stored
    }

    pub fn remember(&self, user_id: i64, key: &str, response: StoredResponse) {
        let recorded = Recorded { response, at: self.clock.now() };
        self.entries.lock().insert((user_id, key.to_string()), recorded);
    }

    /// Forget every response recorded longer ago than the TTL.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, recorded| now.saturating_duration_since(recorded.at) <= self.ttl);
        let removed = before.saturating_sub(entries.len());
        if removed > 0 {
            info!(removed, "Forgot lapsed idempotency keys");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_IDEMPOTENCY_TTL_SECS))
    }
}

impl ExpiringStore for IdempotencyStore {
    fn sweep_expired(&self) -> usize {
        IdempotencyStore::sweep_expired(self)
    }
}
