//! Pipeline orchestrator: runs the stages in order inside a bounded retry
//! loop.
//!
//! Attempt states: `Generating → Rendering → Narrating → Muxing → Uploading
//! → Succeeded`, with `AttemptFailed` from any state on an attempt-fatal
//! error. A failed attempt releases its scope, backs off, and starts again
//! from generation; once the budget is spent the run ends in
//! `ExhaustedFailure` carrying only the last error.

use std::sync::Arc;

use explainer_core::concept::ConceptRequest;
use explainer_core::ffmpeg::MediaToolkit;
use explainer_core::render::Renderer;
use explainer_core::speech::SpeechSynthesizer;
use explainer_genai::GenerativeModel;
use explainer_storage::{ArtifactStore, ResourceKind};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::{AttemptScope, RequestContext};
use crate::error::PipelineError;
use crate::stages::{CodeGenerationStage, FinalVideo, MuxStage, NarrationStage, RenderStage};

/// External capabilities the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn GenerativeModel>,
    pub renderer: Arc<dyn Renderer>,
    pub media: Arc<dyn MediaToolkit>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub store: Arc<dyn ArtifactStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Generating,
    Rendering,
    Narrating,
    Muxing,
    Uploading,
    Succeeded,
    AttemptFailed,
    ExhaustedFailure,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub video_url: String,
    pub explanation: String,
    /// Attempt on which the run succeeded (1-based).
    pub attempt_count: u32,
    pub audio_script: Option<String>,
    pub has_audio: bool,
    pub audio_warnings: Vec<String>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    generation: CodeGenerationStage,
    render: RenderStage,
    narration: NarrationStage,
    mux: MuxStage,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let Collaborators {
            model,
            renderer,
            media,
            speech,
            store,
        } = collaborators;

        Self {
            generation: CodeGenerationStage::new(Arc::clone(&model), config.entry_point.clone()),
            render: RenderStage::new(renderer, Arc::clone(&media), Arc::clone(&config)),
            narration: NarrationStage::new(model, speech, Arc::clone(&media), Arc::clone(&config)),
            mux: MuxStage::new(media, Arc::clone(&config)),
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for an already-validated request.
    pub async fn run(
        &self,
        request: &ConceptRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        let mut ctx = RequestContext::create(&self.config.scratch_root).await?;
        let request_id = ctx.request_id();
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        tracing::info!(
            %request_id,
            voice = request.voice_type.as_str(),
            speed = request.speech_speed,
            max_attempts,
            "Pipeline run started",
        );

        for attempt in 1..=max_attempts {
            let mut scope = ctx.begin_attempt(attempt);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                r = self.run_attempt(request, &ctx, &mut scope, cancel) => r,
            };

            match result {
                Ok(result) => {
                    // Local copies go only after the upload is confirmed.
                    scope.release().await;
                    ctx.close().await;
                    tracing::info!(
                        %request_id,
                        attempt,
                        state = ?AttemptState::Succeeded,
                        has_audio = result.has_audio,
                        "Pipeline run succeeded",
                    );
                    return Ok(result);
                }
                Err(PipelineError::Cancelled) => {
                    scope.release().await;
                    ctx.close().await;
                    tracing::info!(%request_id, attempt, "Pipeline run cancelled");
                    return Err(PipelineError::Cancelled);
                }
                Err(e) => {
                    tracing::warn!(
                        %request_id,
                        attempt,
                        max_attempts,
                        state = ?AttemptState::AttemptFailed,
                        error = %e,
                        "Pipeline attempt failed",
                    );
                    scope.release().await;
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                let delay = self.config.backoff.delay_for(attempt);
                tracing::debug!(%request_id, attempt, ?delay, "Backing off");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        ctx.close().await;
                        return Err(PipelineError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        ctx.close().await;
        tracing::error!(
            %request_id,
            attempts = max_attempts,
            state = ?AttemptState::ExhaustedFailure,
            last_error = %last_error,
            "Pipeline run exhausted its attempts",
        );
        Err(PipelineError::ExhaustedRetries {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn run_attempt(
        &self,
        request: &ConceptRequest,
        ctx: &RequestContext,
        scope: &mut AttemptScope,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        let request_id = ctx.request_id();
        let attempt = scope.attempt();
        let log_state = |state: AttemptState| {
            tracing::info!(%request_id, attempt, ?state, "Attempt state");
        };

        log_state(AttemptState::Generating);
        let artifact = self.generation.run(&request.description).await?;

        log_state(AttemptState::Rendering);
        let video = self
            .render
            .run(&artifact.source_code, ctx, scope, cancel)
            .await?;

        let mut audio_warnings = Vec::new();
        let mut audio_script = None;
        let final_video = if self.config.narration_enabled {
            log_state(AttemptState::Narrating);
            let (narration, warnings) = self
                .narration
                .run(&video, request, ctx, scope, cancel)
                .await?
                .into_parts();
            audio_warnings.extend(warnings);
            audio_script = Some(narration.script);

            log_state(AttemptState::Muxing);
            let (final_video, warnings) = self
                .mux
                .run(&video, narration.audio, ctx, scope, cancel)
                .await
                .into_parts();
            audio_warnings.extend(warnings);
            final_video
        } else {
            FinalVideo::video_only(&video)
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        log_state(AttemptState::Uploading);
        let stored = self
            .store
            .upload(&final_video.path, ResourceKind::Video, &self.config.storage_folder)
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;

        Ok(PipelineResult {
            video_url: stored.url,
            explanation: artifact.explanation,
            attempt_count: attempt,
            audio_script,
            has_audio: final_video.has_audio,
            audio_warnings,
        })
    }
}
