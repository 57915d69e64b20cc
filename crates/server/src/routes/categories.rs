//! `/api/categories`

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use fintrack_domain::Category;

use super::idempotent;
use crate::error::ApiError;
use crate::gate::AuthUser;
use crate::state::AppState;
use crate::stores::StoredResponse;

pub async fn list(State(state): State<AppState>, user: AuthUser) -> Json<Vec<Category>> {
    Json(state.ledger.list_categories(user.user_id))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<Category>, JsonRejection>,
) -> Result<Response, ApiError> {
    idempotent(&state, user.user_id, &headers, || {
        let Json(category) = payload.map_err(name_and_type_required)?;
        let created = state.ledger.create_category(user.user_id, category)?;
        StoredResponse::json(StatusCode::CREATED, &created)
    })
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<Category>, JsonRejection>,
) -> Result<Response, ApiError> {
    idempotent(&state, user.user_id, &headers, || {
        let Json(category) = payload.map_err(name_and_type_required)?;
        let updated = state.ledger.update_category(user.user_id, category)?;
        StoredResponse::json(StatusCode::OK, &updated)
    })
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    idempotent(&state, user.user_id, &headers, || {
        let Path(id) = id?;
        state.ledger.delete_category(user.user_id, id)?;
        Ok(StoredResponse::empty(StatusCode::NO_CONTENT))
    })
}

// A body without `name` or `type` fails to decode before validation runs.
fn name_and_type_required(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(_) => ApiError::BadRequest("Name and Type required".into()),
        other => ApiError::from(other),
    }
}
