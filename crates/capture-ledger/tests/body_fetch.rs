//! Response-body retrieval: background enrichment and HTTP replay.

use std::sync::Arc;
use std::time::Duration;

use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use capture_ledger::{
    BodyFetcher, BodyProbe, CaptureLedger, CaptureTap, HttpBodyFetcher, LedgerConfig, LedgerEvent,
    RequestObserved, ResponseObserved, StaticFetcher,
};
use serde_json::json;
use tapforge_core_types::{PayloadKind, ResourceKind};

const CART_URL: &str = "https://shop.example.com/api/cart";

async fn spawn_server() -> std::net::SocketAddr {
    async fn data(headers: axum::http::HeaderMap) -> impl IntoResponse {
        let token = headers
            .get("x-auth-token")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("none")
            .to_string();
        Json(json!({"ok": true, "token": token}))
    }
    async fn page() -> impl IntoResponse {
        Html("<html><body>hi</body></html>")
    }
    async fn echo(body: String) -> String {
        body
    }
    let app = Router::new()
        .route("/api/data", get(data))
        .route("/page", get(page))
        .route("/echo", post(echo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn probe(url: String, method: &str) -> BodyProbe {
    BodyProbe {
        url,
        method: method.to_string(),
        headers: Default::default(),
        body: None,
    }
}

#[tokio::test]
async fn replay_carries_headers_and_tags_json() {
    let addr = spawn_server().await;
    let fetcher = HttpBodyFetcher::new(Duration::from_secs(5)).expect("client");
    let mut request = probe(format!("http://{addr}/api/data"), "GET");
    request
        .headers
        .insert("X-Auth-Token".to_string(), "tok-1".to_string());
    let fetched = fetcher.fetch(&request).await.expect("fetch");
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.kind, PayloadKind::Json);
    assert!(fetched.content.contains("\"token\":\"tok-1\""));
}

#[tokio::test]
async fn replay_tags_html() {
    let addr = spawn_server().await;
    let fetcher = HttpBodyFetcher::new(Duration::from_secs(5)).expect("client");
    let fetched = fetcher
        .fetch(&probe(format!("http://{addr}/page"), "GET"))
        .await
        .expect("fetch");
    assert_eq!(fetched.kind, PayloadKind::Html);
    assert!(fetched.content.contains("<body>hi</body>"));
}

#[tokio::test]
async fn replay_preserves_method_and_body() {
    let addr = spawn_server().await;
    let fetcher = HttpBodyFetcher::new(Duration::from_secs(5)).expect("client");
    let mut request = probe(format!("http://{addr}/echo"), "POST");
    request.body = Some("ping".to_string());
    let fetched = fetcher.fetch(&request).await.expect("fetch");
    assert_eq!(fetched.content, "ping");
}

#[tokio::test]
async fn unreachable_host_surfaces_fetch_failure() {
    let fetcher = HttpBodyFetcher::new(Duration::from_millis(500)).expect("client");
    let err = fetcher
        .fetch(&probe("http://127.0.0.1:9/none".to_string(), "GET"))
        .await
        .expect_err("refused");
    assert!(matches!(err, capture_ledger::LedgerError::FetchFailed(_)));
}

#[tokio::test]
async fn success_response_triggers_background_fetch() {
    let fetcher = StaticFetcher {
        status: 200,
        content: r#"{"temp":18}"#.to_string(),
        kind: PayloadKind::Json,
    };
    let ledger =
        Arc::new(CaptureLedger::new(LedgerConfig::default()).with_fetcher(Arc::new(fetcher)));
    let tap = CaptureTap::new(Arc::clone(&ledger));
    tap.on_request(RequestObserved::new(CART_URL, "GET", ResourceKind::Xhr));
    let mut bus = ledger.subscribe();
    tap.on_response(ResponseObserved::new(CART_URL, 200));

    let (id, kind) = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match bus.recv().await {
                Ok(LedgerEvent::BodyAttached { id, kind }) => break (id, kind),
                Ok(_) => continue,
                Err(err) => panic!("bus closed: {err}"),
            }
        }
    })
    .await
    .expect("body attached in time");

    assert_eq!(kind, PayloadKind::Json);
    let record = ledger.get(&id).expect("record");
    let body = record.response_body.expect("body");
    assert_eq!(body.content, r#"{"temp":18}"#);
    assert_eq!(body.kind, PayloadKind::Json);
}

#[tokio::test]
async fn error_responses_do_not_trigger_background_fetch() {
    let ledger = Arc::new(
        CaptureLedger::new(LedgerConfig::default()).with_fetcher(Arc::new(StaticFetcher::default())),
    );
    let tap = CaptureTap::new(Arc::clone(&ledger));
    tap.on_request(RequestObserved::new(CART_URL, "GET", ResourceKind::Xhr));
    tap.on_response(ResponseObserved::new(CART_URL, 500));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let record = &ledger.list()[0];
    assert_eq!(record.status, Some(500));
    assert!(record.response_body.is_none());
}
