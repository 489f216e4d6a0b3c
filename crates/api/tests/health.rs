//! Integration tests for the health, root and debug endpoints and general
//! HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};
use explainer_pipeline::testing::Stubs;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: GET /health and GET /
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let root = tempfile::tempdir().unwrap();
    let app = common::build_test_app(&Stubs::new(), root.path());
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn root_returns_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let app = common::build_test_app(&Stubs::new(), root.path());
    let response = get(app, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "Hello": "World" }));
}

// ---------------------------------------------------------------------------
// Test: general HTTP behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let root = tempfile::tempdir().unwrap();
    let app = common::build_test_app(&Stubs::new(), root.path());
    let response = get(app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let root = tempfile::tempdir().unwrap();
    let app = common::build_test_app(&Stubs::new(), root.path());
    let response = get(app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    // A UUID: 36 chars with hyphens.
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: debug endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debug_config_exposes_pipeline_settings() {
    let root = tempfile::tempdir().unwrap();
    let app = common::build_test_app(&Stubs::new(), root.path());
    let response = get(app, "/debug/config").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["max_attempts"], 3);
    assert_eq!(json["backoff_step_ms"], 20);
    assert_eq!(json["backoff_cap_ms"], 200);
    assert_eq!(json["entry_point"], "ExplainConcept");
    assert_eq!(json["render_quality"], "medium");
    assert_eq!(json["storage_folder"], "concept_explanations");
    assert_eq!(json["tools"]["ffmpeg"], "ffmpeg");
    assert_eq!(
        json["scratch_root"],
        root.path().to_string_lossy().to_string()
    );
}

/// Configured binaries that do not exist are reported unavailable rather
/// than failing the request.
#[tokio::test]
async fn debug_tools_reports_missing_binaries() {
    let root = tempfile::tempdir().unwrap();
    let mut config = explainer_pipeline::testing::fast_config(root.path());
    config.tools.manim = "/nonexistent/manim".into();
    let stubs = Stubs::new();
    let app = common::build_test_app_with(
        &stubs,
        config,
        tokio_util::sync::CancellationToken::new(),
    );
    let response = get(app, "/debug/tools").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let tools = json.as_array().unwrap();
    assert_eq!(tools.len(), 4);
    assert_eq!(tools[0]["tool"], "manim");
    assert_eq!(tools[0]["available"], false);
    assert!(tools[0]["error"].is_string());
}
