//! Mux stage: rendered video plus optional narration audio in, final video
//! out. Never fails the attempt; on any muxing problem the rendered video is
//! returned unchanged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use explainer_core::ffmpeg::{MediaToolkit, MuxJob, MuxStrategy};
use explainer_core::readiness::wait_for_stable_file;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::{AttemptScope, RequestContext};
use crate::error::PipelineError;
use crate::outcome::StageOutcome;
use crate::stages::narration::AudioTrack;
use crate::stages::render::RenderedVideo;

/// The video handed to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalVideo {
    pub path: PathBuf,
    pub has_audio: bool,
}

impl FinalVideo {
    /// The rendered video, used as-is without audio.
    pub fn video_only(video: &RenderedVideo) -> Self {
        Self {
            path: video.path.clone(),
            has_audio: false,
        }
    }
}

pub struct MuxStage {
    media: Arc<dyn MediaToolkit>,
    config: Arc<PipelineConfig>,
}

impl MuxStage {
    pub fn new(media: Arc<dyn MediaToolkit>, config: Arc<PipelineConfig>) -> Self {
        Self { media, config }
    }

    pub async fn run(
        &self,
        video: &RenderedVideo,
        audio: Option<AudioTrack>,
        ctx: &RequestContext,
        scope: &mut AttemptScope,
        cancel: &CancellationToken,
    ) -> StageOutcome<FinalVideo> {
        let Some(audio) = audio else {
            return StageOutcome::Complete(FinalVideo::video_only(video));
        };

        let output_path = ctx.scratch_path(&format!("final_a{}.mp4", scope.attempt()));
        scope.register_file(&output_path);

        let outcome = self.combine(video, &audio, &output_path, scope, cancel).await;

        // The narration audio is no longer needed whatever happened.
        scope.release_path(&audio.path).await;
        outcome
    }

    async fn combine(
        &self,
        video: &RenderedVideo,
        audio: &AudioTrack,
        output_path: &Path,
        scope: &mut AttemptScope,
        cancel: &CancellationToken,
    ) -> StageOutcome<FinalVideo> {
        let muxed = FinalVideo {
            path: output_path.to_path_buf(),
            has_audio: true,
        };

        let primary = MuxStrategy::PadToDuration {
            target_secs: video.duration_secs,
        };
        let primary_error = match self.attempt_mux(video, audio, output_path, primary, cancel).await {
            Ok(()) => return StageOutcome::Complete(muxed),
            Err(e) => e,
        };
        tracing::warn!(error = %primary_error, "Padded mux failed; trying duration-capped fallback");

        let audio_secs = match audio.duration_secs {
            Some(secs) => Some(secs),
            None => self.media.probe_duration(&audio.path).await.ok(),
        };
        let cap_secs = audio_secs
            .map(|a| a.min(video.duration_secs))
            .unwrap_or(video.duration_secs);

        let fallback = MuxStrategy::HardCap { cap_secs };
        match self.attempt_mux(video, audio, output_path, fallback, cancel).await {
            Ok(()) => StageOutcome::Degraded {
                value: muxed,
                warnings: vec![format!(
                    "{primary_error}; narration trimmed to {cap_secs:.1}s"
                )],
            },
            Err(fallback_error) => {
                tracing::warn!(error = %fallback_error, "Fallback mux failed; returning video without audio");
                scope.release_path(output_path).await;
                StageOutcome::Degraded {
                    value: FinalVideo::video_only(video),
                    warnings: vec![
                        primary_error.to_string(),
                        format!("{fallback_error}; video returned without narration"),
                    ],
                }
            }
        }
    }

    /// Run one mux invocation and confirm the output settled to a non-empty
    /// file.
    async fn attempt_mux(
        &self,
        video: &RenderedVideo,
        audio: &AudioTrack,
        output_path: &Path,
        strategy: MuxStrategy,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let job = MuxJob {
            video_path: video.path.clone(),
            audio_path: audio.path.clone(),
            output_path: output_path.to_path_buf(),
            strategy,
        };

        self.media
            .mux(&job)
            .await
            .map_err(|e| PipelineError::Mux(e.to_string()))?;

        wait_for_stable_file(output_path, self.config.stability, cancel)
            .await
            .map_err(|e| PipelineError::Mux(e.to_string()))?;
        Ok(())
    }
}
