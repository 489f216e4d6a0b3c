use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use explainer_core::error::CoreError;
use explainer_pipeline::PipelineError;
use explainer_storage::StorageError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce `{ "detail": ..., "code": ... }`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Pipeline(err) => match err {
                PipelineError::Cancelled => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    "The server is shutting down; please retry".to_string(),
                ),
                PipelineError::ExhaustedRetries { .. } => {
                    tracing::error!(error = %err, "Pipeline exhausted its attempts");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PIPELINE_FAILED",
                        err.to_string(),
                    )
                }
                other => {
                    tracing::error!(error = %other, "Pipeline error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PIPELINE_FAILED",
                        other.to_string(),
                    )
                }
            },

            AppError::Storage(err) => match err {
                StorageError::InvalidLocator(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_VIDEO_URL", err.to_string())
                }
                other => {
                    tracing::error!(error = %other, "Storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        other.to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "detail": detail,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
