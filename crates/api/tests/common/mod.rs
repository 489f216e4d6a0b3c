use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use explainer_api::config::ServerConfig;
use explainer_api::router::build_app_router;
use explainer_api::state::AppState;
use explainer_pipeline::testing::{fast_config, Stubs};
use explainer_pipeline::{Pipeline, PipelineConfig};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Build the full application router over stub collaborators with a fast
/// pipeline config rooted at `scratch_root`.
pub fn build_test_app(stubs: &Stubs, scratch_root: &Path) -> Router {
    build_test_app_with(stubs, fast_config(scratch_root), CancellationToken::new())
}

/// Same as [`build_test_app`] with an explicit pipeline config and
/// shutdown token.
pub fn build_test_app_with(
    stubs: &Stubs,
    pipeline_config: PipelineConfig,
    shutdown: CancellationToken,
) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(Pipeline::new(pipeline_config, stubs.collaborators())),
        store: stubs.store.clone(),
        shutdown,
    };
    build_app_router(state, &config)
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

pub async fn delete_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::DELETE, uri, body).await
}
