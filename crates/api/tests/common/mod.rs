#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use simfarm_api::config::ServerConfig;
use simfarm_api::router::build_app_router;
use simfarm_api::state::AppState;
use simfarm_dispatch::{spawn_dispatcher, DispatcherConfig, DispatcherHandle};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 16 * 1024 * 1024,
        dispatcher: DispatcherConfig::default(),
    }
}

/// A router over a freshly spawned dispatcher.
pub struct TestApp {
    pub router: Router,
    pub dispatcher: DispatcherHandle,
    pub cancel: CancellationToken,
}

/// Build the full application router, exactly as `main.rs` does, over a
/// dispatcher private to this test. Must be called inside a Tokio runtime.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let cancel = CancellationToken::new();
    let (dispatcher, _task) = spawn_dispatcher(config.dispatcher.clone(), cancel.clone());
    let state = AppState {
        dispatcher: dispatcher.clone(),
        config: Arc::new(config.clone()),
    };
    TestApp {
        router: build_app_router(state, &config),
        dispatcher,
        cancel,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_bytes(app: &Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    let request = Request::post(uri).body(body.into()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: &serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Issue an RPC call and return the decoded reply envelope.
pub async fn rpc(app: &Router, method: &str, params: serde_json::Value) -> serde_json::Value {
    let response = post_json(app, "/rpc", &serde_json::json!({ "method": method, "params": params })).await;
    assert_eq!(response.status(), 200, "rpc {method} should be transported");
    body_json(response).await
}
