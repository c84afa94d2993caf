//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get};
use simfarm_core::Job;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with dispatcher counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_reports_dispatcher_stats() {
    let app = common::build_test_app();
    app.dispatcher
        .submit(Job::new(vec!["sim".into()], "x"))
        .await
        .unwrap();

    let response = get(&app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["dispatcher"]["queued"], 1);
    assert_eq!(json["dispatcher"]["cached_jobs"], 1);
}

// ---------------------------------------------------------------------------
// Test: health turns 503 once the dispatcher is gone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_is_unavailable_after_dispatcher_stops() {
    let app = common::build_test_app();
    app.cancel.cancel();
    while !app.dispatcher.is_closed() {
        tokio::task::yield_now().await;
    }

    let response = get(&app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unavailable");
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = common::build_test_app();
    let response = get(&app.router, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = common::build_test_app();
    let response = get(&app.router, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: CORS preflight OPTIONS request returns correct headers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_returns_correct_headers() {
    let app = common::build_test_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/job/submit")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers["access-control-allow-origin"],
        "http://localhost:5173"
    );
    let allow_methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(
        allow_methods.contains("POST"),
        "Allow-Methods should contain POST, got: {allow_methods}"
    );
}

#[tokio::test]
async fn wildcard_cors_allows_any_origin() {
    let mut config = common::test_config();
    config.cors_origins = vec!["*".into()];
    let app = common::build_test_app_with(config);

    let request = Request::get("/health")
        .header("Origin", "http://anywhere.example")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
