//! Integration tests for `GET /aggregate` against a live info backend.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use edge_relay::config::model::{AggregatorConfig, Config, FailurePolicy};
use edge_relay::identity::ServerIdentity;
use edge_relay::server::{self, AppState};

const HOSTS: [&str; 3] = ["backend-1", "backend-2", "backend-3"];

#[derive(Default)]
struct InfoBackend {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    stalled: AtomicUsize,
    stalls_started: AtomicUsize,
}

/// Decrements `stalled` when the backend handler finishes or is dropped.
struct StallGuard(Arc<InfoBackend>);

impl Drop for StallGuard {
    fn drop(&mut self) {
        self.0.stalled.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InfoBackend {
    fn next_host(&self) -> &'static str {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        HOSTS[n % HOSTS.len()]
    }
}

fn info_body(hostname: &str) -> Json<Value> {
    Json(json!({
        "uuid": uuid::Uuid::new_v4().to_string(),
        "hostname": hostname,
        "exec_time": "1 ms",
    }))
}

/// Routes:
/// - `/info` rotates through [`HOSTS`]
/// - `/flaky` fails every third call with 500
/// - `/garbage` answers something that is not JSON
/// - `/busy` holds each call for 30ms and records peak concurrency
/// - `/stall` never answers in time
async fn start_info_backend() -> (SocketAddr, Arc<InfoBackend>) {
    let backend = Arc::new(InfoBackend::default());

    async fn info(State(b): State<Arc<InfoBackend>>) -> Json<Value> {
        info_body(b.next_host())
    }

    async fn flaky(State(b): State<Arc<InfoBackend>>) -> Response {
        let n = b.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 3 == 0 {
            return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
        }
        info_body("backend-1").into_response()
    }

    async fn garbage() -> &'static str {
        "definitely not json"
    }

    async fn busy(State(b): State<Arc<InfoBackend>>) -> Json<Value> {
        let now = b.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        b.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        b.in_flight.fetch_sub(1, Ordering::SeqCst);
        info_body(b.next_host())
    }

    async fn stall(State(b): State<Arc<InfoBackend>>) -> Json<Value> {
        b.stalled.fetch_add(1, Ordering::SeqCst);
        b.stalls_started.fetch_add(1, Ordering::SeqCst);
        let _guard = StallGuard(Arc::clone(&b));
        tokio::time::sleep(Duration::from_secs(5)).await;
        info_body("backend-1")
    }

    let app = Router::new()
        .route("/info", get(info))
        .route("/flaky", get(flaky))
        .route("/garbage", get(garbage))
        .route("/busy", get(busy))
        .route("/stall", get(stall))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, backend)
}

async fn start_edge(aggregator: AggregatorConfig) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let config = Config {
        aggregator,
        ..Config::default()
    };
    let state = Arc::new(
        AppState::from_config(
            &config,
            server::build_http_client(),
            ServerIdentity::new("edge-test", "10.0.0.1"),
            None,
        )
        .unwrap(),
    );
    let router = server::build_router(state, 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

fn aggregator_for(backend: SocketAddr, path: &str) -> AggregatorConfig {
    AggregatorConfig {
        endpoint: format!("http://{backend}{path}"),
        ..AggregatorConfig::default()
    }
}

fn millis(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|s| s.strip_suffix(" ms"))
        .and_then(|n| n.parse().ok())
        .unwrap_or_else(|| panic!("not a duration: {value}"))
}

async fn get_json(url: String) -> (StatusCode, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn counts_responses_by_source_and_bucket() {
    let (backend, info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/info")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=6")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info.calls.load(Ordering::SeqCst), 6);

    assert_eq!(body["responses"].as_array().unwrap().len(), 6);
    assert_eq!(body["backend1_count"], 2);
    assert_eq!(body["backend2_count"], 2);
    assert_eq!(body["failed"], 0);

    let by_source: BTreeMap<String, u64> =
        serde_json::from_value(body["count_by_source"].clone()).unwrap();
    assert_eq!(
        by_source,
        BTreeMap::from([
            ("backend-1".to_string(), 2),
            ("backend-2".to_string(), 2),
            ("backend-3".to_string(), 2),
        ])
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn every_response_is_reported_with_timing() {
    let (backend, _info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/busy")).await;

    let (_, body) = get_json(format!("http://{addr}/aggregate?count=5")).await;
    let responses = body["responses"].as_array().unwrap();

    let uuids: HashSet<&str> = responses
        .iter()
        .map(|r| r["uuid"].as_str().unwrap())
        .collect();
    assert_eq!(uuids.len(), 5);

    let slowest = responses.iter().map(|r| millis(&r["exec_time"])).max().unwrap();
    assert!(slowest >= 30);
    assert!(millis(&body["total_time"]) >= slowest);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn single_call_aggregation() {
    let (backend, _info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/info")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"][0]["hostname"], "backend-1");
    assert_eq!(body["backend1_count"], 1);
    assert_eq!(body["backend2_count"], 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn custom_identity_buckets() {
    let (backend, _info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        identities: BTreeMap::from([("backend-3".to_string(), "canary_count".to_string())]),
        ..aggregator_for(backend, "/info")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let (_, body) = get_json(format!("http://{addr}/aggregate?count=3")).await;
    assert_eq!(body["canary_count"], 1);
    assert!(body.get("backend1_count").is_none());
    assert_eq!(body["count_by_source"]["backend-1"], 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn count_parameter_is_validated() {
    let (backend, info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        max_count: 10,
        ..aggregator_for(backend, "/info")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let cases = [
        ("", "count parameter is required"),
        ("?count=", "count parameter is required"),
        ("?count=abc", "invalid count parameter"),
        ("?count=2.5", "invalid count parameter"),
        ("?count=0", "count must be at least 1"),
        ("?count=-3", "count must be at least 1"),
        ("?count=11", "count exceeds limit of 10"),
        ("?count=abc&count=2", "invalid count parameter"),
    ];
    for (query, message) in cases {
        let resp = reqwest::get(format!("http://{addr}/aggregate{query}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "query {query:?}");
        assert_eq!(resp.text().await.unwrap(), message, "query {query:?}");
    }
    assert_eq!(info.calls.load(Ordering::SeqCst), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn failures_are_counted_when_failing_open() {
    let (backend, _info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/flaky")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=6")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"].as_array().unwrap().len(), 4);
    assert_eq!(body["failed"], 2);
    assert_eq!(body["backend1_count"], 4);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn undecodable_answers_count_as_failures() {
    let (backend, _info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/garbage")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"].as_array().unwrap().len(), 0);
    assert_eq!(body["failed"], 3);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn failing_closed_returns_502() {
    let (backend, _info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        failure_policy: FailurePolicy::Closed,
        ..aggregator_for(backend, "/flaky")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let resp = reqwest::get(format!("http://{addr}/aggregate?count=6"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    assert_eq!(
        resp.text().await.unwrap(),
        "aggregation incomplete: 2 of 6 calls failed"
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn failing_closed_passes_clean_runs() {
    let (backend, _info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        failure_policy: FailurePolicy::Closed,
        ..aggregator_for(backend, "/info")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let (backend, info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        max_concurrency: 3,
        ..aggregator_for(backend, "/busy")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=12")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"].as_array().unwrap().len(), 12);

    let peak = info.peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 3, "peak concurrency was {peak}");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn deadline_cuts_the_aggregation_short() {
    let (backend, _info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        deadline: Some(200),
        ..aggregator_for(backend, "/stall")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let started = std::time::Instant::now();
    let (status, body) = get_json(format!("http://{addr}/aggregate?count=4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 4);
    assert_eq!(body["responses"].as_array().unwrap().len(), 0);
    assert!(started.elapsed() < Duration::from_secs(3));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn call_timeout_fails_individual_calls() {
    let (backend, _info) = start_info_backend().await;
    let aggregator = AggregatorConfig {
        call_timeout: Some(100),
        ..aggregator_for(backend, "/stall")
    };
    let (addr, shutdown) = start_edge(aggregator).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 3);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unreachable_endpoint_fails_every_call() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let (addr, shutdown) = start_edge(aggregator_for(dead, "/info")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 2);
    assert_eq!(body["backend1_count"], 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn repeated_count_uses_first_value() {
    let (backend, info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/info")).await;

    let (status, body) = get_json(format!("http://{addr}/aggregate?count=2&count=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"].as_array().unwrap().len(), 2);
    assert_eq!(info.calls.load(Ordering::SeqCst), 2);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn client_disconnect_cancels_backend_calls() {
    let (backend, info) = start_info_backend().await;
    let (addr, shutdown) = start_edge(aggregator_for(backend, "/stall")).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let result = client
        .get(format!("http://{addr}/aggregate?count=3"))
        .send()
        .await;
    assert!(result.is_err());
    assert_eq!(info.stalls_started.load(Ordering::SeqCst), 3);

    // The stalled handlers sleep for 5s; they only finish early if the
    // edge dropped its outbound calls.
    let mut remaining = info.stalled.load(Ordering::SeqCst);
    for _ in 0..40 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        remaining = info.stalled.load(Ordering::SeqCst);
    }
    assert_eq!(remaining, 0, "backend calls still in flight after disconnect");

    let _ = shutdown.send(());
}
