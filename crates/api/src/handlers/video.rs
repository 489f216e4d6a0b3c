//! Handler for `DELETE /delete-video`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteVideoRequest {
    pub video_url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteVideoResponse {
    pub status: &'static str,
}

/// DELETE /delete-video
///
/// Resolves the public id from the delivery URL and destroys the stored
/// video. A URL that does not parse is rejected before the store is called.
pub async fn delete_video(
    State(state): State<AppState>,
    payload: Result<Json<DeleteVideoRequest>, JsonRejection>,
) -> AppResult<Json<DeleteVideoResponse>> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let public_id = state.store.delete_by_url(&body.video_url).await?;
    tracing::info!(%public_id, "Deleted stored video");

    Ok(Json(DeleteVideoResponse { status: "success" }))
}
