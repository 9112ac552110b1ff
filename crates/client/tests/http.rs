//! HTTP transports exercised against an in-process axum server.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bandit_client::{BanditClient, BanditError, ClientConfig, LoadState};
use bandit_core::MetricsSample;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Recorded {
    site_queries: Vec<HashMap<String, String>>,
    session_headers: Vec<Option<String>>,
    metrics: Vec<(HashMap<String, String>, Value)>,
}

type Shared = Arc<Mutex<Recorded>>;

async fn site(
    State(rec): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let mut rec = rec.lock();
    rec.site_queries.push(query);
    rec.session_headers.push(
        headers
            .get("x-ib-session")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    Json(json!({
        "name": "test-ab",
        "variants": [{"name": "A"}, {"name": "B"}]
    }))
}

async fn metrics(
    State(rec): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    rec.lock().metrics.push((query, body));
    StatusCode::NO_CONTENT
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn healthy_server() -> (String, Shared) {
    let rec: Shared = Arc::default();
    let app = Router::new()
        .route("/api/site", get(site))
        .route("/api/metrics", post(metrics))
        .with_state(rec.clone());
    (serve(app).await, rec)
}

fn sample(metric: &str) -> MetricsSample {
    MetricsSample {
        timestamp: Utc::now(),
        origin: "default".into(),
        session: String::new(),
        site: "test-ab".into(),
        variant: "B".into(),
        metric: metric.into(),
        value: 1.0,
    }
}

#[tokio::test]
async fn test_load_over_http_with_explicit_selection() {
    let (base_url, rec) = healthy_server().await;
    let client = BanditClient::new(ClientConfig {
        base_url,
        ..Default::default()
    });

    let state = client.load_with(Some("B")).await;

    assert_eq!(state.state, LoadState::Ready);
    assert_eq!(state.variant_name(), Some("B"));
    let rec = rec.lock();
    assert_eq!(rec.site_queries.len(), 1);
    assert_eq!(rec.site_queries[0].get("select").map(String::as_str), Some("B"));
    assert!(!rec.site_queries[0].contains_key("ts"));
    assert_eq!(rec.session_headers[0], None);
}

#[tokio::test]
async fn test_timestamp_is_appended_when_configured() {
    let (base_url, rec) = healthy_server().await;
    let client = BanditClient::new(ClientConfig {
        base_url,
        append_timestamp: true,
        ..Default::default()
    });

    client.load().await;

    let ts = rec.lock().site_queries[0]
        .get("ts")
        .cloned()
        .expect("timestamp parameter");
    assert!(ts.parse::<i64>().unwrap() > 0);
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let app = Router::new().route("/api/site", get(broken));
    let base_url = serve(app).await;
    let client = BanditClient::new(ClientConfig {
        base_url,
        ..Default::default()
    });

    let state = client.load().await;

    assert_eq!(state.state, LoadState::Ready);
    assert_eq!(state.variant_name(), Some("default"));
    assert!(matches!(
        state.error.as_deref(),
        Some(BanditError::HttpStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_server_falls_back() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = BanditClient::new(ClientConfig {
        base_url: format!("http://{addr}/"),
        ..Default::default()
    });

    let state = client.load().await;

    assert!(state.is_ready());
    assert_eq!(state.site_name(), Some("default"));
    assert!(state.error.as_deref().is_some_and(BanditError::is_transport));
}

#[tokio::test]
async fn test_malformed_base_url_falls_back() {
    for base_url in ["", "localhost:3000/", "not a url"] {
        let client = BanditClient::new(ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        });

        let state = client.load().await;

        assert_eq!(state.state, LoadState::Ready);
        assert_eq!(state.site_name(), Some("default"));
        assert_eq!(state.variant_name(), Some("default"));
        assert!(matches!(
            state.error.as_deref(),
            Some(BanditError::InvalidUrl(_))
        ));

        client.push(sample("exposures")).await;
        client.flush().await;
        assert_eq!(client.metrics().len(), 1);
    }
}

#[tokio::test]
async fn test_metrics_are_posted_with_scope() {
    let (base_url, rec) = healthy_server().await;
    let client = BanditClient::new(ClientConfig {
        base_url,
        batch_size: 2,
        ..Default::default()
    });

    client.load_with(Some("B")).await;
    client.push(sample("exposures")).await;
    client.push(sample("conversions")).await;

    assert!(client.metrics().is_empty());
    let rec = rec.lock();
    assert_eq!(rec.metrics.len(), 1);
    let (query, body) = &rec.metrics[0];
    assert_eq!(query.get("site").map(String::as_str), Some("test-ab"));
    assert_eq!(query.get("variant").map(String::as_str), Some("B"));
    let batch = body.as_array().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0]["metric"], "exposures");
    assert_eq!(batch[1]["metric"], "conversions");
    assert!(batch[0]["ts"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_rejected_metrics_stay_queued() {
    let app = Router::new()
        .route("/api/site", get(site))
        .route("/api/metrics", post(broken))
        .with_state(Shared::default());
    let base_url = serve(app).await;
    let client = BanditClient::new(ClientConfig {
        base_url,
        ..Default::default()
    });

    client.load().await;
    client.push(sample("exposures")).await;
    client.flush().await;

    assert_eq!(client.metrics().len(), 1);
    assert!(!client.metrics().has_pending_flush());
}
