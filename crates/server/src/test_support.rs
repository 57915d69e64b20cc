//! Request harness shared by route tests

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crate::state::AppState;
use crate::stores::UserStore;

/// User store with minimal Argon2 cost so tests stay fast.
pub fn fast_user_store() -> UserStore {
    let params = Params::new(8, 1, 1, None).unwrap();
    UserStore::with_hasher(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Router plus a pre-issued session for user 1 ("alice").
pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub token: String,
}

impl Harness {
    pub fn new() -> Self {
        let state = AppState { users: Arc::new(fast_user_store()), ..AppState::default() };
        let token = state.sessions.issue(1, "alice").token;
        Self { app: crate::router(state.clone()), state, token }
    }

    pub fn token_for(&self, user_id: i64, username: &str) -> String {
        self.state.sessions.issue(user_id, username).token
    }

    /// Public (token-less) JSON `POST`.
    pub async fn post_public(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.dispatch(request).await
    }

    /// Send one request and decode the JSON body (`Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Value>,
        key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder =
            Request::builder().method(method).uri(uri).header(AUTHORIZATION, format!("Bearer {token}"));
        if let Some(key) = key {
            builder = builder.header("Idempotency-Key", key);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }
}
