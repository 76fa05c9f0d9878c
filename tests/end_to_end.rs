//! Whole-pipeline checks: capture feeds the vault, the vault feeds tool
//! execution, and the relay carries the result back to the reasoner.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::{HeaderMap as AxumHeaders, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use capture_ledger::{
    CaptureLedger, CaptureTap, CompletionObserved, LedgerConfig, RequestObserved, ResponseObserved,
};
use header_vault::HeaderVault;
use query_relay::{
    HttpRemoteReasoner, InMemoryCatalog, PendingToolCall, QueryOrchestrator, QueryStatus,
    RelayConfig, RemoteConfig, ScriptedReasoner, ToolDescriptor, ToolRunner,
};
use serde_json::json;
use tapforge_core_types::{HeaderMap, PayloadKind, ResourceKind, ToolId};

/// `/weather` answers only when the session's API key is presented, the
/// same contract a credentialed production endpoint would enforce.
async fn weather_endpoint(headers: AxumHeaders) -> impl IntoResponse {
    match headers.get("x-api-key").and_then(|value| value.to_str().ok()) {
        Some("k-123") => (StatusCode::OK, Json(json!({ "temp": 18 }))).into_response(),
        _ => (StatusCode::UNAUTHORIZED, "missing api key").into_response(),
    }
}

async fn spawn_weather_server() -> Result<SocketAddr> {
    let app = Router::new().route("/weather", get(weather_endpoint));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

/// Replay one captured exchange through the tap, as if the browser had
/// just called the weather API with its session credentials.
fn replay_weather_capture(tap: &CaptureTap) {
    let url = "https://api.weather.example.com/v1/now?city=Paris";
    let mut headers = HeaderMap::new();
    headers.insert("X-Api-Key".to_string(), "k-123".to_string());
    headers.insert("Accept".to_string(), "application/json".to_string());

    tap.on_request(RequestObserved::new(url, "GET", ResourceKind::Xhr).with_headers(headers));
    tap.on_response(ResponseObserved::new(url, 200));
    tap.on_completed(CompletionObserved::new(url).with_status(200));
}

fn fast_config() -> RelayConfig {
    RelayConfig {
        poll_interval_ms: 10,
        max_poll_attempts: 40,
        tool_timeout_ms: 2_000,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn captured_credentials_carry_into_relayed_tool_calls() -> Result<()> {
    let addr = spawn_weather_server().await?;

    // Capture phase: the browser hits the weather API, the vault learns
    // its credential headers as a side effect.
    let vault = Arc::new(HeaderVault::new());
    let ledger = Arc::new(
        CaptureLedger::new(LedgerConfig {
            auto_fetch_bodies: false,
            ..LedgerConfig::default()
        })
        .with_vault(Arc::clone(&vault)),
    );
    let tap = CaptureTap::new(Arc::clone(&ledger));
    replay_weather_capture(&tap);

    assert_eq!(ledger.len(), 1);
    assert_eq!(vault.len(), 1);
    let cached = vault
        .get("api.weather.example.com")
        .ok_or_else(|| anyhow::anyhow!("vault should hold the capture domain"))?;
    assert_eq!(cached.get("X-Api-Key").map(String::as_str), Some("k-123"));

    // Relay phase: the tool targets the loopback server, a domain the
    // vault has never seen, so execution must fall back to the most
    // recent credentials to satisfy the endpoint.
    let weather_tool = ToolDescriptor::new(
        ToolId::from("1"),
        "weather-now",
        format!("http://{addr}/weather"),
        "GET",
    );
    let catalog = Arc::new(InMemoryCatalog::with_tools(vec![weather_tool]));
    let remote = Arc::new(ScriptedReasoner::with_tool_call(
        "18°C in Paris",
        PendingToolCall::new(ToolId::from("1")),
        2,
    ));
    let runner = ToolRunner::new(Arc::clone(&vault), Duration::from_millis(2_000))?;
    let orchestrator =
        QueryOrchestrator::new(catalog, Arc::clone(&remote) as _, runner, fast_config());

    let query = orchestrator.run("what is the weather in Paris right now?").await;

    assert_eq!(query.status, QueryStatus::Completed);
    let answer = query
        .result
        .ok_or_else(|| anyhow::anyhow!("completed query should carry an answer"))?;
    assert_eq!(answer.answer, "18°C in Paris");

    // Two empty polls, then the delivering one; polling stops once the
    // call is handed out.
    assert_eq!(remote.polls(), 3);

    // The relayed envelope carries the endpoint's JSON untouched.
    let submitted = remote.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].success);
    assert_eq!(submitted[0].data, Some(json!({ "temp": 18 })));
    assert_eq!(submitted[0].content_kind, PayloadKind::Json);
    assert!(submitted[0].error.is_none());

    assert_eq!(orchestrator.active_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_remote_degrades_to_captured_tool_summary() -> Result<()> {
    // Grab a port nothing listens on by binding and dropping it.
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };

    let catalog = Arc::new(InMemoryCatalog::with_tools(vec![ToolDescriptor::new(
        ToolId::from("1"),
        "weather-now",
        "https://api.weather.example.com/v1/now",
        "GET",
    )]));
    let remote = Arc::new(HttpRemoteReasoner::new(RemoteConfig {
        base_url: format!("http://{dead_addr}"),
        user_id: "tester".to_string(),
        solve_timeout_ms: 1_000,
        poll_timeout_ms: 1_000,
    })?);
    let vault = Arc::new(HeaderVault::new());
    let runner = ToolRunner::new(vault, Duration::from_millis(1_000))?;
    let orchestrator = QueryOrchestrator::new(catalog, remote, runner, fast_config());

    let query = orchestrator.run("weather in Paris?").await;

    assert_eq!(query.status, QueryStatus::Failed);
    let fallback = query
        .result
        .ok_or_else(|| anyhow::anyhow!("failed query with candidates should degrade, not vanish"))?;
    assert!(
        fallback.answer.contains("weather-now"),
        "fallback should name the captured tool: {}",
        fallback.answer
    );
    assert_eq!(fallback.reasoning.as_deref(), Some("degraded local fallback"));
    assert_eq!(orchestrator.active_count(), 0);
    Ok(())
}
