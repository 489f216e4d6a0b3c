//! Integration tests for `POST /explain-concept`.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use explainer_core::concept::VoiceType;
use explainer_pipeline::testing::{fast_config, Stubs};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test: successful run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explain_concept_returns_video_and_explanation() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(
        app,
        "/explain-concept",
        json!({
            "description": "the Pythagorean theorem",
            "voice_type": "female",
            "speech_speed": 1.25
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["video_url"]
        .as_str()
        .unwrap()
        .starts_with("https://res.cloudinary.com/demo/video/upload/"));
    assert!(!json["explanation"].as_str().unwrap().is_empty());
    assert_eq!(json["attempts"], 1);
    assert_eq!(json["has_audio"], true);
    assert!(json["audio_script"].is_string());
    assert_eq!(json["audio_warnings"], json!([]));

    let speech = stubs.speech.requests();
    assert_eq!(speech.len(), 1);
    assert_eq!(speech[0].voice, VoiceType::Female);
    assert!((speech[0].speed - 1.25).abs() < f32::EPSILON);
}

/// Omitted voice and speed fall back to their defaults.
#[tokio::test]
async fn explain_concept_applies_defaults() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(app, "/explain-concept", json!({ "description": "entropy" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    let speech = stubs.speech.requests();
    assert_eq!(speech[0].voice, VoiceType::Male);
    assert!((speech[0].speed - 1.0).abs() < f32::EPSILON);
}

// ---------------------------------------------------------------------------
// Test: validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn speech_speed_out_of_range_returns_400() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(
        app,
        "/explain-concept",
        json!({ "description": "entropy", "speech_speed": 3.0 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["detail"].is_string());
    assert_eq!(stubs.renderer.call_count(), 0);
}

#[tokio::test]
async fn blank_description_returns_400() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(app, "/explain-concept", json!({ "description": "   " })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(stubs.model.requests().is_empty());
}

#[tokio::test]
async fn unknown_voice_type_returns_400() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(
        app,
        "/explain-concept",
        json!({ "description": "entropy", "voice_type": "robot" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: failures
// ---------------------------------------------------------------------------

/// Every attempt fails generation; the body names the attempt count and
/// the last error.
#[tokio::test]
async fn exhausted_retries_return_500_with_last_error() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    stubs
        .model
        .set_code_response(Err("quota exceeded".to_string()));
    let app = common::build_test_app(&stubs, root.path());

    let response = post_json(app, "/explain-concept", json!({ "description": "entropy" })).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "PIPELINE_FAILED");
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.starts_with("Failed after 3 attempts"));
    assert!(detail.contains("quota exceeded"));
    assert!(stubs.store.uploads().is_empty());
}

/// A run started after shutdown began is cancelled and reported as 503.
#[tokio::test]
async fn cancelled_run_returns_503() {
    let root = tempfile::tempdir().unwrap();
    let stubs = Stubs::new();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let app = common::build_test_app_with(&stubs, fast_config(root.path()), shutdown);

    let response = post_json(app, "/explain-concept", json!({ "description": "entropy" })).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "SHUTTING_DOWN");
    assert!(stubs.store.uploads().is_empty());
}
