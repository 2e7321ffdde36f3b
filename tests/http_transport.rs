//! Purpose: End-to-end tests for the HTTP transport against a loopback server.
//! Exports: None (integration test module).
//! Role: Validate batching over real TCP, header forwarding, and failure mapping.
//! Invariants: Server binds 127.0.0.1 on an ephemeral port and lives for one test.
//! Invariants: Bounded waits avoid test flakiness.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use jigdata::api::{
    ApiCall, ErrorKind, HttpTransport, RequestOptions, Status, Transport, TransportRequest,
};
use jigdata::{ApiConfig, ApiContext};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const WAIT: Duration = Duration::from_secs(5);

async fn keyed_reply(
    State(hits): State<Arc<AtomicUsize>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let trace = headers
        .get("x-trace")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let mut reply = Map::new();
    if let Some(entries) = payload.as_object() {
        for (id, call) in entries {
            reply.insert(
                id.clone(),
                json!({
                    "status": "ok",
                    "action": call["action"],
                    "windowId": call["windowId"],
                    "trace": trace,
                }),
            );
        }
    }
    Json(Value::Object(reply))
}

async fn spawn_server(hits: Arc<AtomicUsize>) -> TestResult<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api", post(keyed_reply))
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/html",
            post(|| async { (StatusCode::OK, "<html>maintenance</html>") }),
        )
        .with_state(hits);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn same_tick_requests_travel_in_one_http_call() -> TestResult<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let base_url = spawn_server(hits.clone()).await?;
    let ctx = ApiContext::builder(
        ApiConfig::default()
            .with_base_url(base_url)
            .with_ping_delay(None),
    )
    .build()?;

    let query = ctx.request(ApiCall::new("layer", "query"), RequestOptions::new());
    let get = ctx.request(ApiCall::new("layer", "get"), RequestOptions::new());

    let query = query.wait_timeout(WAIT).await?;
    let get = get.wait_timeout(WAIT).await?;
    assert_eq!(query.status, Status::Ok);
    assert_eq!(query.get("action"), Some(&json!("query")));
    assert_eq!(get.get("action"), Some(&json!("get")));
    assert_eq!(
        get.get("windowId"),
        Some(&json!(ctx.window_id().as_str()))
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn header_settings_are_forwarded() -> TestResult<()> {
    let base_url = spawn_server(Arc::new(AtomicUsize::new(0))).await?;
    let ctx = ApiContext::builder(
        ApiConfig::default()
            .with_base_url(base_url)
            .with_ping_delay(None),
    )
    .build()?;

    let response = ctx
        .request(
            ApiCall::new("user", "whoami"),
            RequestOptions::new()
                .with_setting("headers", json!({"x-trace": "abc123"}))
                .with_setting("timeout_ms", 2_000),
        )
        .wait_timeout(WAIT)
        .await?;
    assert_eq!(response.get("trace"), Some(&json!("abc123")));
    Ok(())
}

#[tokio::test]
async fn server_errors_surface_as_transport_errors() -> TestResult<()> {
    let base_url = spawn_server(Arc::new(AtomicUsize::new(0))).await?;
    let transport = HttpTransport::new(base_url)?;
    let err = transport
        .post(TransportRequest {
            url: "/broken".to_string(),
            body: "{}".to_string(),
            settings: Map::new(),
        })
        .await
        .err()
        .ok_or("expected an error")?;
    assert_eq!(err.kind(), ErrorKind::Transport);
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_resolves_nothing() -> TestResult<()> {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let ctx = ApiContext::builder(
        ApiConfig::default()
            .with_base_url(format!("http://{addr}"))
            .with_ping_delay(None),
    )
    .build()?;
    let handle = ctx.request(ApiCall::new("user", "whoami"), RequestOptions::new());
    ctx.api().next_flush().wait_timeout(WAIT).await?;
    assert!(!handle.is_resolved());
    Ok(())
}

#[tokio::test]
async fn html_reply_reaches_the_transport_error_hook() -> TestResult<()> {
    let base_url = spawn_server(Arc::new(AtomicUsize::new(0))).await?;
    let ctx = ApiContext::builder(
        ApiConfig::default()
            .with_base_url(base_url)
            .with_url("/html")
            .with_ping_delay(None),
    )
    .build()?;
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let handle = ctx.request(
        ApiCall::new("user", "whoami"),
        RequestOptions::new().on_transport_error(move |raw, reply| {
            *sink.lock().unwrap() = Some((reply.status, raw.to_string()));
        }),
    );
    ctx.api().next_flush().wait_timeout(WAIT).await?;

    assert_eq!(
        *seen.lock().unwrap(),
        Some((200, "<html>maintenance</html>".to_string()))
    );
    assert!(!handle.is_resolved());
    Ok(())
}
