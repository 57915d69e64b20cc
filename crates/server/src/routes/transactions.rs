//! `/api/transactions`

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use fintrack_domain::{Transaction, TransactionFilter};

use super::idempotent;
use crate::error::ApiError;
use crate::gate::AuthUser;
use crate::state::AppState;
use crate::stores::StoredResponse;

/// `GET` with optional `startDate`, `endDate` and `categoryId`.
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    filter: Result<Query<TransactionFilter>, QueryRejection>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let Query(filter) = filter?;
    Ok(Json(state.ledger.list_transactions(user.user_id, &filter)))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Result<Response, ApiError> {
    idempotent(&state, user.user_id, &headers, || {
        let Json(transaction) = payload?;
        let created = state.ledger.create_transaction(user.user_id, transaction)?;
        StoredResponse::json(StatusCode::CREATED, &created)
    })
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Result<Response, ApiError> {
    idempotent(&state, user.user_id, &headers, || {
        let Json(transaction) = payload?;
        let updated = state.ledger.update_transaction(user.user_id, transaction)?;
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
        state.ledger.delete_transaction(user.user_id, id)?;
        Ok(StoredResponse::empty(StatusCode::NO_CONTENT))
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::test_support::Harness;

    fn lunch() -> Value {
        json!({
            "type": "EXPENSE",
            "amountCents": 1250,
            "description": "Lunch",
            "date": "2024-03-01"
        })
    }

    #[tokio::test]
    async fn create_then_list() {
        let h = Harness::new();

        let (status, created) = h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], 1);
        assert_eq!(created["userId"], 1);

        let (status, listed) = h.send("GET", "/api/transactions", &h.token, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([created]));
    }

    #[tokio::test]
    async fn list_applies_query_filters() {
        let h = Harness::new();
        for date in ["2024-01-15", "2024-02-15", "2024-03-15"] {
            let mut body = lunch();
            body["date"] = json!(date);
            h.send("POST", "/api/transactions", &h.token, Some(body), None).await;
        }

        let (status, listed) = h
            .send("GET", "/api/transactions?startDate=2024-02-01&endDate=2024-02-29", &h.token, None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["date"], "2024-02-15");

        let (status, _) =
            h.send("GET", "/api/transactions?startDate=yesterday", &h.token, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn repeated_idempotency_key_applies_once() {
        let h = Harness::new();

        let (first_status, first) =
            h.send("POST", "/api/transactions", &h.token, Some(lunch()), Some("key-1")).await;
        let (second_status, second) =
            h.send("POST", "/api/transactions", &h.token, Some(lunch()), Some("key-1")).await;

        assert_eq!(first_status, StatusCode::CREATED);
        assert_eq!(second_status, StatusCode::CREATED);
        assert_eq!(first, second);

        let (_, listed) = h.send("GET", "/api/transactions", &h.token, None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Without a key every call applies
        h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;
        h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;
        let (_, listed) = h.send("GET", "/api/transactions", &h.token, None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn repeated_delete_key_answers_no_content() {
        let h = Harness::new();
        h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;

        let (first, _) = h.send("DELETE", "/api/transactions/1", &h.token, None, Some("del-1")).await;
        let (second, _) = h.send("DELETE", "/api/transactions/1", &h.token, None, Some("del-1")).await;
        let (fresh, _) = h.send("DELETE", "/api/transactions/1", &h.token, None, Some("del-2")).await;

        assert_eq!(first, StatusCode::NO_CONTENT);
        assert_eq!(second, StatusCode::NO_CONTENT);
        assert_eq!(fresh, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_validates_id_and_ownership() {
        let h = Harness::new();
        let (_, created) = h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;

        let (status, body) = h.send("PUT", "/api/transactions", &h.token, Some(lunch()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Transaction ID required for update");

        let bob = h.token_for(2, "bob");
        let mut stolen = created.clone();
        stolen["amountCents"] = json!(1);
        let (status, _) = h.send("PUT", "/api/transactions", &bob, Some(stolen), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut edited = created;
        edited["description"] = json!("Team lunch");
        let (status, updated) = h.send("PUT", "/api/transactions", &h.token, Some(edited), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "Team lunch");
    }

    #[tokio::test]
    async fn users_cannot_see_or_delete_each_others_data() {
        let h = Harness::new();
        h.send("POST", "/api/transactions", &h.token, Some(lunch()), None).await;
        let bob = h.token_for(2, "bob");

        let (_, listed) = h.send("GET", "/api/transactions", &bob, None, None).await;
        assert_eq!(listed, json!([]));

        let (status, _) = h.send("DELETE", "/api/transactions/1", &bob, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, listed) = h.send("GET", "/api/transactions", &h.token, None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let h = Harness::new();

        let (status, body) = h
            .send("POST", "/api/transactions", &h.token, Some(json!({"description": "no type"})), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let mut blank = lunch();
        blank["description"] = json!(" ");
        let (status, _) = h.send("POST", "/api/transactions", &h.token, Some(blank), Some("k")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.state.idempotency.is_empty());
    }
}
