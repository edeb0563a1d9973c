#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tally_common::crypto::RsaPrivateKey;
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::state::AppState;
use tally_storage::memory::MemStorage;
use tally_storage::MetricsStorage;
use tower::util::ServiceExt;

pub struct TestContext {
    pub storage: Arc<dyn MetricsStorage>,
    pub state: AppState,
    pub app: Router,
}

pub fn build_test_context() -> TestContext {
    build_context(None, None)
}

pub fn build_context(key: Option<&str>, private_key: Option<RsaPrivateKey>) -> TestContext {
    let storage: Arc<dyn MetricsStorage> = Arc::new(MemStorage::new());
    let config = ServerConfig {
        key: key.map(str::to_string),
        ..ServerConfig::default()
    };
    let state = AppState::new(storage.clone(), config, private_key);
    let app = app::build_http_app(state.clone());
    TestContext {
        storage,
        state,
        app,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("response should be JSON")
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> TestResponse {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn post_bytes(
    app: &Router,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(body)).expect("request should build")).await
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post(app: &Router, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}
