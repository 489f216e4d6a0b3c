//! Handler for `POST /explain-concept`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use explainer_core::concept::ConceptRequest;
use explainer_pipeline::PipelineResult;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response body for a successful explanation.
#[derive(Debug, Serialize)]
pub struct ExplainConceptResponse {
    pub video_url: String,
    pub explanation: String,
    /// Attempt on which the run succeeded.
    pub attempts: u32,
    pub audio_script: Option<String>,
    pub has_audio: bool,
    pub audio_warnings: Vec<String>,
}

impl From<PipelineResult> for ExplainConceptResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            video_url: result.video_url,
            explanation: result.explanation,
            attempts: result.attempt_count,
            audio_script: result.audio_script,
            has_audio: result.has_audio,
            audio_warnings: result.audio_warnings,
        }
    }
}

/// POST /explain-concept
///
/// Validates the request, then runs the full pipeline inline. The run is
/// tied to a child of the server's shutdown token.
pub async fn explain_concept(
    State(state): State<AppState>,
    payload: Result<Json<ConceptRequest>, JsonRejection>,
) -> AppResult<Json<ExplainConceptResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    request.check()?;

    tracing::info!(
        description_chars = request.description.chars().count(),
        voice = request.voice_type.as_str(),
        speed = request.speech_speed,
        "Explain-concept request accepted",
    );

    let cancel = state.shutdown.child_token();
    let result = state.pipeline.run(&request, &cancel).await?;

    Ok(Json(result.into()))
}
