//! Registration, login and logout

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use fintrack_domain::{LoginResponse, RegisterRequest, RegisterResponse};
use serde::Deserialize;
use tokio::task;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::gate::bearer_token;
use crate::state::AppState;

/// Login body with both fields optional so a missing one maps to 400.
#[derive(Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(request) = payload?;

    let users = state.users.clone();
    let summary = task::spawn_blocking(move || users.register(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("registration task failed: {e}")))?
        .inspect_err(|err| warn!(error = %err, "Registration failed"))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id: summary.id, username: summary.username }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(body) = payload?;
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(ApiError::BadRequest("Username and password required".into()));
    };

    let users = state.users.clone();
    let user = task::spawn_blocking(move || users.authenticate(&username, &password))
        .await
        .map_err(|e| ApiError::Internal(format!("authentication task failed: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;

    let session = state.sessions.issue(user.id, &user.username);
    info!(user_id = user.id, username = %user.username, "User authenticated");

    Ok(Json(LoginResponse { token: session.token, user_id: user.id, user }))
}

/// Revoke the caller's bearer token. Always answers 204.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    StatusCode::NO_CONTENT
}
