//! Request gate: bearer-token check in front of every non-public route.
//!
//! Paths under `/api/auth/` and the health check pass through untouched.
//! Everything else needs `Authorization: Bearer <token>` that validates
//! against the session registry; the resolved identity is attached to the
//! request as an [`AuthUser`] extension. Validation slides the token's TTL.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use fintrack_domain::constants::{BEARER_PREFIX, HEALTH_PATH, PUBLIC_AUTH_PREFIX};
use fintrack_domain::SessionIdentity;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Caller identity injected by [`require_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

impl From<SessionIdentity> for AuthUser {
    fn from(identity: SessionIdentity) -> Self {
        Self { user_id: identity.user_id, username: identity.username }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(ApiError::unauthorized)
    }
}

/// `true` for paths that never require a session.
pub fn is_public_path(path: &str) -> bool {
    path.starts_with(PUBLIC_AUTH_PREFIX) || path == HEALTH_PATH
}

/// Token carried by an `Authorization: Bearer` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware enforcing a valid session on non-public routes.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let identity = bearer_token(request.headers()).and_then(|token| state.sessions.validate(token));
    match identity {
        Some(identity) => {
            request.extensions_mut().insert(AuthUser::from(identity));
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "rejected request without a valid session");
            ApiError::unauthorized().into_response()
        }
    }
}
