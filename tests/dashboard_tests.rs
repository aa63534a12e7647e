use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use flight_poll::dashboard::{router, DashboardState};
use flight_poll::dataset::ResultTicket;
use flight_poll::metrics::init_metrics;
use flight_poll::query::{JobRegistry, QueryCatalog, QueryClass};

/// Helper to create test state
fn create_test_state() -> DashboardState {
    DashboardState {
        registry: Arc::new(JobRegistry::new()),
        catalog: QueryCatalog::default(),
    }
}

async fn get_json(app: Router, uri: &str) -> Value {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_list_queries_empty() {
    let app = router(create_test_state());

    let json = get_json(app, "/api/queries").await;

    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_queries_shows_job_details() {
    let state = create_test_state();
    let short = state
        .registry
        .create(QueryClass::new("short", Duration::from_secs(60), 1_000))
        .unwrap();
    let long = state
        .registry
        .create(QueryClass::new("long", Duration::from_secs(120), 2_000))
        .unwrap();
    long.record_progress(0.25).await;
    short
        .complete(ResultTicket::Query {
            query: "short".to_string(),
            job: short.handle.id(),
            rows: 1_000,
        })
        .await;

    let json = get_json(router(state.clone()), "/api/queries").await;

    let queries = json.as_array().unwrap();
    assert_eq!(queries.len(), 2);

    assert_eq!(queries[0]["handle"], short.handle.to_string());
    assert_eq!(queries[0]["query"], "short");
    assert_eq!(queries[0]["status"], "completed");
    assert_eq!(queries[0]["progress"], 1.0);

    assert_eq!(queries[1]["handle"], long.handle.to_string());
    assert_eq!(queries[1]["status"], "running");
    assert_eq!(queries[1]["progress"], 0.25);
    assert!(queries[1]["submitted_at"].is_string());
    assert!(queries[1]["expires_at"].is_string());

    // Viewing never consumes a job
    assert_eq!(state.registry.len(), 2);
}

#[tokio::test]
async fn test_list_classes() {
    let app = router(create_test_state());

    let json = get_json(app, "/api/classes").await;

    let classes = json.as_array().unwrap();
    let names: Vec<&str> = classes
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["long", "short", "ultra-long", "very-long"]);
    assert_eq!(classes[1]["duration"], 60);
    assert_eq!(classes[1]["rows"], 1_000);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    init_metrics().unwrap();
    let app = router(create_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = router(create_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
