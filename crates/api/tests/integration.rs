//! Integration tests for the API layer.
//!
//! Requests are driven through the router in-process with
//! `tower::ServiceExt::oneshot`; specialists observe a static probe.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use ein_agents::{Observation, SpecialistRegistry, StaticProbe};
use ein_api::{create_router, AppState};
use ein_common::Capability;
use ein_coordinator::orchestrator::default_strategy;
use ein_coordinator::{CorrelationEngine, HandoffState, Router};
use ein_session::{InMemoryStore, InvestigationView, SessionDeps, SessionManager};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(120);

fn test_state() -> Arc<AppState> {
    let probe = StaticProbe::new().with(
        Capability::InspectStorageCluster,
        Observation::new("osd:osd.5", "OSD down: disk I/O errors", 0.95),
    );
    let deps = SessionDeps {
        router: Arc::new(Router::builtin()),
        strategy: default_strategy(),
        registry: SpecialistRegistry::standard(Arc::new(probe)),
        correlation: CorrelationEngine::default(),
        store: Arc::new(InMemoryStore::new()),
    };
    Arc::new(AppState::new(SessionManager::new(deps)))
}

async fn send(
    state: &Arc<AppState>,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = create_router(state.clone())
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(state: &Arc<AppState>, path: &str) -> (StatusCode, Value) {
    send(state, Method::GET, path, None).await
}

async fn post(state: &Arc<AppState>, path: &str, body: Value) -> (StatusCode, Value) {
    send(state, Method::POST, path, Some(body)).await
}

async fn wait_until(
    state: &Arc<AppState>,
    id: &str,
    pred: impl Fn(&InvestigationView) -> bool,
) -> InvestigationView {
    let mut rx = state.sessions.subscribe(id).unwrap();
    let view = tokio::time::timeout(WAIT, async move {
        rx.wait_for(|v| pred(v)).await.map(|v| (*v).clone())
    })
    .await
    .expect("status did not change");
    view.expect("runner went away")
}

fn osd_alert() -> Value {
    json!({
        "fingerprint": "fp-osd",
        "labels": {
            "alertname": "CephOSDDown",
            "severity": "critical",
            "namespace": "rook-ceph"
        },
        "annotations": { "summary": "ceph osd.5 is down" },
        "status": { "state": "active" }
    })
}

async fn create(state: &Arc<AppState>, body: Value) -> String {
    let (status, body) = post(state, "/api/v1/investigations", body).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

// ============================================================================
// Health and routing preview
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let state = test_state();
    let (status, body) = get(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
    assert!(body["route_table_version"].is_string());
}

#[tokio::test]
async fn test_route_preview_does_not_create_investigations() {
    let state = test_state();
    let (status, body) = post(
        &state,
        "/api/v1/route",
        json!({ "text": "ceph osd down on node-3" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["matches"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["specialist"] == "storage"));

    let (_, list) = get(&state, "/api/v1/investigations").await;
    assert_eq!(list, json!([]));
}

// ============================================================================
// Signal / query flow
// ============================================================================

#[tokio::test]
async fn test_alert_investigation_end_to_end() {
    let state = test_state();
    let id = create(&state, json!({ "alerts": [osd_alert()] })).await;

    // Confirm every proposal until the correlation report exists.
    let mut last_seq = 0;
    loop {
        let view = wait_until(&state, &id, |v| {
            v.report_ready
                || (v.handoff_state == HandoffState::AwaitingConfirmation
                    && v.events_processed >= last_seq)
        })
        .await;
        if view.report_ready {
            break;
        }
        let (status, body) = post(
            &state,
            &format!("/api/v1/investigations/{}/confirmation", id),
            json!({ "confirmed": true }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        last_seq = body["seq"].as_u64().unwrap();
    }

    let (status, page) = get(&state, &format!("/api/v1/investigations/{}/messages?since=0", id)).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = page["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"proposal"));
    assert_eq!(kinds.last(), Some(&"report"));

    let (status, findings) = get(
        &state,
        &format!("/api/v1/investigations/{}/findings?author=storage", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(findings
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["subject"] == "osd:osd.5"));

    let (status, report) = get(&state, &format!("/api/v1/investigations/{}/report", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report.is_object());

    let (status, view) = get(&state, &format!("/api/v1/investigations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["report_ready"], true);
}

#[tokio::test]
async fn test_message_reads_are_repeatable() {
    let state = test_state();
    let id = create(&state, json!({})).await;
    wait_until(&state, &id, |v| v.messages >= 1).await;

    let path = format!("/api/v1/investigations/{}/messages?since=0", id);
    let (_, first) = get(&state, &path).await;
    let (_, again) = get(&state, &path).await;
    assert_eq!(first, again);
    assert_eq!(first["messages"][0]["kind"], "greeting");

    let cursor = first["cursor"].as_u64().unwrap();
    let (_, empty) = get(
        &state,
        &format!("/api/v1/investigations/{}/messages?since={}", id, cursor),
    )
    .await;
    assert_eq!(empty["messages"], json!([]));
    assert_eq!(empty["cursor"], cursor);
}

#[tokio::test]
async fn test_signals_return_increasing_sequences() {
    let state = test_state();
    let id = create(&state, json!({})).await;

    let path = format!("/api/v1/investigations/{}/messages", id);
    let (status, a) = post(&state, &path, json!({ "text": "hello" })).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (_, b) = post(&state, &path, json!({ "text": "anything new?" })).await;
    assert!(b["seq"].as_u64().unwrap() > a["seq"].as_u64().unwrap());
}

#[tokio::test]
async fn test_cancel_without_body_is_accepted() {
    let state = test_state();
    let id = create(&state, json!({})).await;

    let (status, body) = send(
        &state,
        Method::POST,
        &format!("/api/v1/investigations/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["seq"].is_u64());
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_unknown_investigation_is_404() {
    let state = test_state();

    let (status, body) = get(&state, "/api/v1/investigations/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = post(
        &state,
        "/api/v1/investigations/nope/messages",
        json!({ "text": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_alert_is_rejected() {
    let state = test_state();
    let (status, body) = post(
        &state,
        "/api/v1/investigations",
        json!({ "alerts": [{ "labels": { "alertname": "NoFingerprint" } }] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_report_before_correlation_is_404() {
    let state = test_state();
    let id = create(&state, json!({})).await;

    let (status, body) = get(&state, &format!("/api/v1/investigations/{}/report", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "REPORT_NOT_READY");
}

#[tokio::test]
async fn test_archived_investigation_rejects_signals() {
    let state = test_state();
    let id = create(&state, json!({})).await;

    let (status, _) = send(
        &state,
        Method::DELETE,
        &format!("/api/v1/investigations/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = post(
        &state,
        &format!("/api/v1/investigations/{}/messages", id),
        json!({ "text": "still there?" }),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "ARCHIVED");

    // Reads keep working.
    let (status, view) = get(&state, &format!("/api/v1/investigations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["archived"], true);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let state = test_state();
    let (status, _) = post(&state, "/api/v1/batches", json!({ "alerts": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
