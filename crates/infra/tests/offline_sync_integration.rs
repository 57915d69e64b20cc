//! End-to-end offline sync against a real SQLite queue and a mock server.
//!
//! **Coverage:**
//! - Replay sends each queued mutation once per pass with its idempotency key
//! - Transient failures stay queued, rejections are dead-lettered
//! - 401 stops the pass and leaves the remainder queued
//! - Router writes go to the queue while offline and drain on reconnect
//! - Only the signed-in user's operations are replayed

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fintrack_core::connectivity::{ConnectivityMonitor, ConnectivityMonitorConfig, ReachabilityProbe};
use fintrack_core::sync::{DeadLetterLog, OperationQueue, SyncEngine, SyncEngineConfig};
use fintrack_core::{DeliveryContext, ExpenseService};
use fintrack_domain::{
    Category, CategoryType, ConnectionState, Credentials, DeadLetterReason, EntityKind,
    NewOperation, OperationKind, Transaction, TransactionDetails,
};
use serde_json::json;
use support::{api_client, signed_in_client, TestDatabase};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn lunch() -> Transaction {
    Transaction::Expense(TransactionDetails {
        id: None,
        user_id: None,
        amount_cents: 1_250,
        description: "Lunch".into(),
        date: "2024-03-01".parse().unwrap(),
        category_id: None,
        category_name: None,
    })
}

fn stored_lunch(id: i64) -> serde_json::Value {
    json!({
        "type": "EXPENSE",
        "id": id,
        "userId": 1,
        "amountCents": 1250,
        "description": "Lunch",
        "date": "2024-03-01"
    })
}

const ALICE: i64 = 1;

fn engine_for(db: &TestDatabase, server: &MockServer) -> SyncEngine {
    SyncEngine::new(
        db.queue(),
        db.dead_letters(),
        signed_in_client(&server.uri(), ALICE),
        SyncEngineConfig::default(),
        DeliveryContext::Inline,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_retries_and_rejection_dead_letters() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .and(header_exists("Idempotency-Key"))
        .respond_with(move |_req: &Request| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(201).set_body_json(stored_lunch(10))
            }
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/categories"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Name and Type required"})))
        .mount(&server)
        .await;

    let engine = engine_for(&db, &server);
    engine
        .enqueue(NewOperation::from_entity(ALICE, OperationKind::Insert, EntityKind::Transaction, &lunch()).unwrap())
        .await
        .unwrap();
    let category = Category {
        id: None,
        user_id: None,
        name: " ".into(),
        category_type: CategoryType::Expense,
        description: None,
    };
    engine
        .enqueue(NewOperation::from_entity(ALICE, OperationKind::Insert, EntityKind::Category, &category).unwrap())
        .await
        .unwrap();

    let first = engine.run_pass().await;
    assert_eq!(first.attempted, 2);
    assert_eq!(first.retried, 1);
    assert_eq!(first.dead_lettered, 1);

    let pending = engine.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);

    let second = engine.run_pass().await;
    assert_eq!(second.succeeded, 1);
    assert_eq!(engine.pending_count().await.unwrap(), 0);

    let dead = engine.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].reason, DeadLetterReason::Rejected);
    assert!(dead[0].last_error.contains("Name and Type required"));

    // Both deliveries of the transaction carried the same key
    let keys: HashSet<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|req| req.url.path() == "/api/transactions")
        .filter_map(|req| req.headers.get("Idempotency-Key"))
        .map(|value| value.to_str().unwrap().to_string())
        .collect();
    assert_eq!(keys.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_operation_is_dead_lettered_after_budget() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/transactions/5"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let engine = engine_for(&db, &server);
    let mut doomed = lunch();
    doomed.details_mut().id = Some(5);
    engine
        .enqueue(NewOperation::from_entity(ALICE, OperationKind::Delete, EntityKind::Transaction, &doomed).unwrap())
        .await
        .unwrap();

    for _ in 0..3 {
        engine.run_pass().await;
    }
    let after_budget = engine.run_pass().await;

    assert_eq!(after_budget.attempted, 0);
    let dead = db.dead_letters().list().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].reason, DeadLetterReason::Exhausted);
    assert_eq!(dead[0].retry_count, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_stops_pass_without_consuming_budget() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized access"})))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&db, &server);
    let reauth = Arc::new(AtomicBool::new(false));
    let reauth_flag = Arc::clone(&reauth);
    engine.on_reauth_required(move || reauth_flag.store(true, Ordering::SeqCst));

    for _ in 0..2 {
        engine
            .enqueue(NewOperation::from_entity(ALICE, OperationKind::Insert, EntityKind::Transaction, &lunch()).unwrap())
            .await
            .unwrap();
    }

    let report = engine.run_pass().await;

    assert!(report.reauth_required);
    assert_eq!(report.deferred, 2);
    assert!(reauth.load(Ordering::SeqCst));
    let queue = db.queue();
    let pending = queue.pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|op| op.retry_count == 0));
}

/// Probe whose answer the test flips by hand
struct SwitchProbe(AtomicBool);

#[async_trait]
impl ReachabilityProbe for SwitchProbe {
    async fn is_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_writes_drain_when_connectivity_returns() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t-1",
            "user": {"id": 1, "username": "alice"},
            "userId": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .and(header_exists("Idempotency-Key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_lunch(77)))
        .expect(2)
        .mount(&server)
        .await;

    let remote = api_client(&server.uri());
    let probe = Arc::new(SwitchProbe(AtomicBool::new(true)));
    let monitor = Arc::new(ConnectivityMonitor::new(
        probe.clone(),
        ConnectivityMonitorConfig {
            probe_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_millis(200),
            join_timeout: Duration::from_secs(1),
        },
        DeliveryContext::Inline,
    ));
    let engine = SyncEngine::new(
        db.queue(),
        db.dead_letters(),
        remote.clone(),
        SyncEngineConfig::default(),
        DeliveryContext::Inline,
    );
    let service = ExpenseService::new(remote, db.cache(), engine.clone(), Arc::clone(&monitor));

    assert_eq!(monitor.probe_now().await, ConnectionState::Online);
    service
        .login(&Credentials { username: "alice".into(), password: "secret1".into() })
        .await
        .unwrap();
    engine.wait_idle().await;

    probe.0.store(false, Ordering::SeqCst);
    assert_eq!(monitor.probe_now().await, ConnectionState::Offline);

    service.add_transaction(&lunch()).await.unwrap();
    service.add_transaction(&lunch()).await.unwrap();
    assert_eq!(engine.pending_count().await.unwrap(), 2);
    assert_eq!(service.list_transactions(&Default::default()).await.unwrap().len(), 2);

    probe.0.store(true, Ordering::SeqCst);
    assert_eq!(monitor.probe_now().await, ConnectionState::Online);
    engine.wait_idle().await;

    assert_eq!(engine.pending_count().await.unwrap(), 0);
    assert_eq!(engine.dead_letter_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn other_users_operations_stay_parked() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_lunch(3)))
        .expect(1)
        .mount(&server)
        .await;

    let queue = db.queue();
    queue
        .enqueue(NewOperation::from_entity(2, OperationKind::Insert, EntityKind::Transaction, &lunch()).unwrap())
        .await
        .unwrap();
    queue
        .enqueue(NewOperation::from_entity(ALICE, OperationKind::Insert, EntityKind::Transaction, &lunch()).unwrap())
        .await
        .unwrap();

    let engine = engine_for(&db, &server);
    let report = engine.run_pass().await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    let parked = queue.pending().await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].user_id, 2);
    assert_eq!(parked[0].retry_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn signed_out_client_replays_nothing() {
    let db = TestDatabase::new();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_lunch(3)))
        .expect(0)
        .mount(&server)
        .await;

    let engine = SyncEngine::new(
        db.queue(),
        db.dead_letters(),
        api_client(&server.uri()),
        SyncEngineConfig::default(),
        DeliveryContext::Inline,
    );
    engine
        .enqueue(NewOperation::from_entity(ALICE, OperationKind::Insert, EntityKind::Transaction, &lunch()).unwrap())
        .await
        .unwrap();

    let report = engine.run_pass().await;

    assert_eq!(report.attempted, 0);
    assert_eq!(engine.pending_count().await.unwrap(), 1);
}
