//! HTTP routes
//!
//! Auth endpoints live under `/api/auth/` and are public; everything else
//! sits behind the request gate.

pub mod auth;
pub mod categories;
pub mod health;
pub mod transactions;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use fintrack_domain::constants::{HEALTH_PATH, IDEMPOTENCY_KEY_HEADER};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stores::StoredResponse;

/// Route table without state or middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(HEALTH_PATH, get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/transactions",
            get(transactions::list).post(transactions::create).put(transactions::update),
        )
        .route("/api/transactions/{id}", delete(transactions::delete))
        .route(
            "/api/categories",
            get(categories::list).post(categories::create).put(categories::update),
        )
        .route("/api/categories/{id}", delete(categories::delete))
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}

/// Value of the `Idempotency-Key` header, if present and non-blank.
pub fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Run a mutation at most once per `(user_id, Idempotency-Key)`.
///
/// A repeated key is answered with the stored response and `apply` is not
/// called. Requests without a key always apply.
pub(crate) fn idempotent<F>(
    state: &AppState,
    user_id: i64,
    headers: &HeaderMap,
    apply: F,
) -> Result<Response, ApiError>
where
    F: FnOnce() -> Result<StoredResponse, ApiError>,
{
    let key = idempotency_key(headers);
    if let Some(stored) = key.and_then(|key| state.idempotency.get(user_id, key)) {
        return Ok(stored.into_response());
    }

    let response = apply()?;
    if let Some(key) = key {
        state.idempotency.remember(user_id, key, response.clone());
    }
    Ok(response.into_response())
}
