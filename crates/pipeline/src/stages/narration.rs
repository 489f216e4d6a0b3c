//! Narration stage: rendered video in, narration script and speech audio
//! out.
//!
//! The video is uploaded to the model provider so the narration can follow
//! what is on screen. Every failure here degrades (fallback script, or no
//! audio) rather than failing the attempt.

use std::path::PathBuf;
use std::sync::Arc;

use explainer_core::concept::ConceptRequest;
use explainer_core::ffmpeg::MediaToolkit;
use explainer_core::poll::{poll_until, PollStep, Probe};
use explainer_core::speech::{SpeechRequest, SpeechSynthesizer};
use explainer_genai::{FileState, GenerativeModel, RemoteFile, ResponseSchema, StructuredRequest};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::{AttemptScope, RequestContext};
use crate::error::PipelineError;
use crate::outcome::StageOutcome;
use crate::stages::render::RenderedVideo;

const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Synthesized narration audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Probed length, when the probe succeeded.
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationOutput {
    /// The script that was (or would have been) spoken. Never empty.
    pub script: String,
    pub audio: Option<AudioTrack>,
}

/// Script used whenever a narration cannot be derived from the video.
pub fn fallback_script(description: &str) -> String {
    format!(
        "Welcome to this visual explanation of {}. Watch closely as the \
         animation builds up the key ideas step by step, showing how each \
         part connects to the whole.",
        description.trim()
    )
}

/// Word count that fits a video of `duration_secs` at `words_per_second`.
pub fn target_word_count(duration_secs: f64, words_per_second: f64) -> u32 {
    (duration_secs * words_per_second).round().max(1.0) as u32
}

pub fn build_narration_prompt(description: &str, duration_secs: f64, words: u32) -> String {
    format!(
        "You are narrating an educational animation about: {description}\n\
         \n\
         Watch the attached video and write a voice-over script for it.\n\
         - The video is {duration_secs:.1} seconds long; write about {words} words \
         so the narration fits.\n\
         - Follow what happens on screen, in order, in the present tense.\n\
         - Use a friendly, conversational tone for a curious student.\n\
         - Plain spoken text only: no markdown, no stage directions, no timestamps."
    )
}

pub fn narration_schema() -> ResponseSchema {
    ResponseSchema::strings(["narration"])
}

#[derive(Debug, Deserialize)]
struct NarrationContract {
    narration: String,
}

// ---------------------------------------------------------------------------
// Remote upload guard
// ---------------------------------------------------------------------------

/// Owns a provider-side uploaded file and deletes it exactly once.
///
/// The delete always runs as a spawned task, so it completes even when the
/// caller is cancelled mid-release. [`release`](Self::release) awaits that
/// task; dropping an unreleased guard spawns it and returns.
pub struct RemoteUploadGuard {
    model: Arc<dyn GenerativeModel>,
    name: Option<String>,
}

impl RemoteUploadGuard {
    pub fn new(model: Arc<dyn GenerativeModel>, name: impl Into<String>) -> Self {
        Self {
            model,
            name: Some(name.into()),
        }
    }

    /// Provider name of the file, or `None` once released.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Delete the remote file. Errors are logged, never returned.
    pub async fn release(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        let task = tokio::spawn(delete_remote(Arc::clone(&self.model), name));
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Remote delete task did not complete");
        }
    }
}

impl Drop for RemoteUploadGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(delete_remote(Arc::clone(&self.model), name));
            }
            Err(_) => {
                tracing::warn!(name = %name, "No runtime available; remote upload left behind");
            }
        }
    }
}

async fn delete_remote(model: Arc<dyn GenerativeModel>, name: String) {
    match model.delete_file(&name).await {
        Ok(()) => tracing::debug!(name = %name, "Remote upload deleted"),
        Err(e) => tracing::warn!(name = %name, error = %e, "Failed to delete remote upload"),
    }
}

/// Polls the provider until an uploaded file is ready for analysis.
struct UploadStateProbe<'a> {
    model: &'a dyn GenerativeModel,
    name: &'a str,
}

impl Probe for UploadStateProbe<'_> {
    type Output = ();

    async fn check(&mut self) -> PollStep<()> {
        match self.model.file_state(self.name).await {
            Ok(FileState::Active) => PollStep::Ready(()),
            Ok(FileState::Failed) => {
                PollStep::Failed(format!("provider failed to process {}", self.name))
            }
            Ok(_) => PollStep::Pending,
            // Transient lookup errors are retried until the budget runs out.
            Err(e) => {
                tracing::debug!(name = %self.name, error = %e, "Upload state lookup failed");
                PollStep::Pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

pub struct NarrationStage {
    model: Arc<dyn GenerativeModel>,
    speech: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaToolkit>,
    config: Arc<PipelineConfig>,
}

impl NarrationStage {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        media: Arc<dyn MediaToolkit>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            model,
            speech,
            media,
            config,
        }
    }

    /// Only cancellation is returned as an error.
    pub async fn run(
        &self,
        video: &RenderedVideo,
        request: &ConceptRequest,
        ctx: &RequestContext,
        scope: &mut AttemptScope,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<NarrationOutput>, PipelineError> {
        let mut warnings = Vec::new();

        let script = match self.analyze(video, &request.description, cancel).await {
            Ok(script) if script.chars().count() >= self.config.min_script_chars => script,
            Ok(script) => {
                warnings.push(format!(
                    "Narration was too short ({} chars); used fallback script",
                    script.chars().count()
                ));
                fallback_script(&request.description)
            }
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "Narration analysis failed; using fallback script");
                warnings.push(format!("{e}; used fallback script"));
                fallback_script(&request.description)
            }
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let audio = match self.synthesize(&script, request, ctx, scope).await {
            Ok(track) => Some(track),
            Err(e) => {
                tracing::warn!(error = %e, "Speech synthesis failed; continuing without audio");
                warnings.push(e.to_string());
                None
            }
        };

        Ok(StageOutcome::from_parts(
            NarrationOutput { script, audio },
            warnings,
        ))
    }

    /// Upload, wait, ask for a narration, and always delete the upload.
    async fn analyze(
        &self,
        video: &RenderedVideo,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let remote = self
            .model
            .upload_file(&video.path, VIDEO_MIME_TYPE)
            .await
            .map_err(|e| PipelineError::NarrationAnalysis(format!("upload failed: {e}")))?;
        let mut guard = RemoteUploadGuard::new(Arc::clone(&self.model), remote.name.clone());

        let result = self.narrate_uploaded(&remote, video, description, cancel).await;
        guard.release().await;
        result
    }

    async fn narrate_uploaded(
        &self,
        remote: &RemoteFile,
        video: &RenderedVideo,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        if remote.state != FileState::Active {
            let mut probe = UploadStateProbe {
                model: self.model.as_ref(),
                name: &remote.name,
            };
            poll_until(&mut probe, self.config.upload_poll, cancel)
                .await
                .map_err(|e| match e {
                    explainer_core::poll::PollError::Cancelled => PipelineError::Cancelled,
                    other => PipelineError::NarrationAnalysis(format!(
                        "uploaded video never became active: {other}"
                    )),
                })?;
        }

        let words = target_word_count(video.duration_secs, self.config.narration_words_per_second);
        let request = StructuredRequest {
            prompt: build_narration_prompt(description, video.duration_secs, words),
            file: Some(remote.file_ref()),
            schema: narration_schema(),
        };

        let text = self
            .model
            .generate_structured(&request)
            .await
            .map_err(|e| PipelineError::NarrationAnalysis(e.to_string()))?;

        let contract: NarrationContract = serde_json::from_str(&text).map_err(|e| {
            PipelineError::NarrationAnalysis(format!("malformed narration response: {e}"))
        })?;
        Ok(contract.narration.trim().to_string())
    }

    async fn synthesize(
        &self,
        script: &str,
        request: &ConceptRequest,
        ctx: &RequestContext,
        scope: &mut AttemptScope,
    ) -> Result<AudioTrack, PipelineError> {
        let path = ctx.scratch_path(&format!("narration_a{}.wav", scope.attempt()));
        scope.register_file(&path);

        let speech = SpeechRequest {
            text: script.to_string(),
            voice: request.voice_type,
            speed: request.speech_speed,
            output_path: path.clone(),
        };
        if let Err(e) = self.speech.synthesize(&speech).await {
            scope.release_path(&path).await;
            return Err(PipelineError::SpeechSynthesis(e.to_string()));
        }

        let duration_secs = match self.media.probe_duration(&path).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                tracing::debug!(error = %e, "Could not probe narration length");
                None
            }
        };

        tracing::info!(
            path = %path.display(),
            duration_secs = ?duration_secs,
            voice = request.voice_type.as_str(),
            "Narration audio synthesized",
        );
        Ok(AudioTrack {
            path,
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_mentions_description_and_meets_minimum() {
        let script = fallback_script("  the Pythagorean theorem ");
        assert!(script.contains("the Pythagorean theorem."));
        assert!(script.chars().count() >= 50);
        assert_eq!(script, fallback_script("the Pythagorean theorem"));
    }

    #[test]
    fn word_target_scales_with_duration() {
        assert_eq!(target_word_count(45.0, 2.5), 113);
        assert_eq!(target_word_count(10.0, 2.5), 25);
        assert_eq!(target_word_count(0.0, 2.5), 1);
    }

    #[test]
    fn prompt_includes_pacing() {
        let prompt = build_narration_prompt("gravity", 45.0, 113);
        assert!(prompt.contains("45.0 seconds"));
        assert!(prompt.contains("about 113 words"));
        assert!(prompt.contains("no markdown"));
    }
}
