//! Wire mapping of the HTTP reasoner client against a loopback service.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use query_relay::{HttpRemoteReasoner, RelayError, RemoteConfig, RemoteReasoner};
use serde_json::{json, Value};
use std::collections::HashMap;
use tapforge_core_types::{PayloadKind, QueryId};

type Captured = Arc<Mutex<Option<(String, Value)>>>;

async fn solve(Json(body): Json<Value>) -> impl IntoResponse {
    if body.get("userId").and_then(Value::as_str).is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!({}))).into_response();
    }
    let question = body.get("question").and_then(Value::as_str).unwrap_or("");
    let query_id = body.get("queryId").and_then(Value::as_str).unwrap_or("");
    Json(json!({
        "answer": format!("echo: {question}"),
        "reasoning": format!("for {query_id}"),
    }))
    .into_response()
}

async fn pending_tool(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !params.contains_key("userId") {
        return (StatusCode::BAD_REQUEST, Json(json!({}))).into_response();
    }
    match id.as_str() {
        "ready" => Json(json!({"toolId": "42", "params": {"city": "Paris"}})).into_response(),
        "silent" => StatusCode::NO_CONTENT.into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn tool_result(
    State(captured): State<Captured>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    *captured.lock() = Some((id, body));
    Json(json!({}))
}

async fn spawn_server() -> (std::net::SocketAddr, Captured) {
    let captured: Captured = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route("/api/queries/solve", post(solve))
        .route("/api/queries/:id/pending-tool", get(pending_tool))
        .route("/api/queries/:id/tool-result", post(tool_result))
        .with_state(Arc::clone(&captured));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, captured)
}

fn reasoner(addr: std::net::SocketAddr) -> HttpRemoteReasoner {
    // Trailing slash on purpose: endpoint joining has to tolerate it.
    let config = RemoteConfig {
        base_url: format!("http://{addr}/api/"),
        user_id: "tester".to_string(),
        ..RemoteConfig::default()
    };
    HttpRemoteReasoner::new(config).expect("client")
}

#[tokio::test]
async fn solve_carries_question_and_identity() {
    let (addr, _) = spawn_server().await;
    let remote = reasoner(addr);
    let answer = remote
        .solve(&QueryId("q-1".to_string()), "capital of France?")
        .await
        .expect("solve");
    assert_eq!(answer.answer, "echo: capital of France?");
    assert_eq!(answer.reasoning.as_deref(), Some("for q-1"));
}

#[tokio::test]
async fn poll_maps_absence_to_none() {
    let (addr, _) = spawn_server().await;
    let remote = reasoner(addr);
    let quiet = remote
        .poll_tool_request(&QueryId("quiet".to_string()))
        .await
        .expect("poll");
    assert!(quiet.is_none());
    let silent = remote
        .poll_tool_request(&QueryId("silent".to_string()))
        .await
        .expect("poll");
    assert!(silent.is_none());
}

#[tokio::test]
async fn poll_decodes_a_pending_call() {
    let (addr, _) = spawn_server().await;
    let remote = reasoner(addr);
    let call = remote
        .poll_tool_request(&QueryId("ready".to_string()))
        .await
        .expect("poll")
        .expect("pending call");
    assert_eq!(call.tool_id.0, "42");
    assert_eq!(call.params, Some(json!({"city": "Paris"})));
}

#[tokio::test]
async fn poll_surfaces_server_errors() {
    let (addr, _) = spawn_server().await;
    let remote = reasoner(addr);
    let err = remote
        .poll_tool_request(&QueryId("broken".to_string()))
        .await
        .expect_err("server error");
    assert!(matches!(err, RelayError::Remote(_)));
}

#[tokio::test]
async fn submit_posts_the_result_envelope() {
    let (addr, captured) = spawn_server().await;
    let remote = reasoner(addr);
    let outcome =
        query_relay::ToolOutcome::success(json!({"temp": 18}), PayloadKind::Json);
    remote
        .submit_tool_result(&QueryId("q-9".to_string()), &outcome)
        .await
        .expect("submit");

    let (id, body) = captured.lock().clone().expect("captured submission");
    assert_eq!(id, "q-9");
    assert_eq!(body.get("userId").and_then(Value::as_str), Some("tester"));
    let result = body.get("result").expect("result envelope");
    assert_eq!(result.get("success"), Some(&json!(true)));
    assert_eq!(result.get("data"), Some(&json!({"temp": 18})));
    assert_eq!(result.get("content_kind"), Some(&json!("json")));
    assert!(result.get("timestamp").is_some());
    // Absent on success, not null.
    assert!(result.get("error").is_none());
}
