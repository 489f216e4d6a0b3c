//! Text-to-speech collaborator.
//!
//! [`EspeakSynthesizer`] renders narration text to a WAV file with the
//! `espeak-ng` command line. Voice presets are selected by
//! [`VoiceType`]; the speaking rate is derived from the request's speed
//! multiplier and clamped to the engine's supported range.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::concept::VoiceType;
use crate::process::{run_process, ProcessError, ProcessRequest};

/// Engine rate (words per minute) at a speed multiplier of 1.0.
pub const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Slowest rate the engine accepts.
pub const MIN_WORDS_PER_MINUTE: u32 = 80;

/// Fastest rate the engine accepts.
pub const MAX_WORDS_PER_MINUTE: u32 = 450;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("narration text is empty")]
    EmptyText,

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("synthesizer produced no audio at {0}")]
    EmptyOutput(String),
}

/// Engine voice and pitch for one voice category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicePreset {
    pub voice: &'static str,
    pub pitch: u32,
}

impl VoicePreset {
    pub fn for_voice(voice: VoiceType) -> Self {
        match voice {
            VoiceType::Male => Self {
                voice: "en-us+m3",
                pitch: 45,
            },
            VoiceType::Female => Self {
                voice: "en-us+f3",
                pitch: 60,
            },
            VoiceType::Child => Self {
                voice: "en-us+f5",
                pitch: 80,
            },
        }
    }
}

/// Engine words-per-minute for a speed multiplier, clamped to the range the
/// engine supports.
pub fn words_per_minute(speed: f32) -> u32 {
    let wpm = (BASE_WORDS_PER_MINUTE * speed).round();
    (wpm.max(0.0) as u32).clamp(MIN_WORDS_PER_MINUTE, MAX_WORDS_PER_MINUTE)
}

/// One synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: VoiceType,
    pub speed: f32,
    /// Destination WAV file.
    pub output_path: PathBuf,
}

/// Turns narration text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<(), SpeechError>;
}

/// [`SpeechSynthesizer`] backed by the `espeak-ng` command line.
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    binary: String,
    timeout: Duration,
}

impl EspeakSynthesizer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Build the invocation. Text is read from `text_path` rather than the
    /// command line so long scripts are not subject to argument limits.
    pub fn build_request(&self, request: &SpeechRequest, text_path: &Path) -> ProcessRequest {
        let preset = VoicePreset::for_voice(request.voice);
        ProcessRequest::new(&self.binary, self.timeout).args([
            "-v".to_string(),
            preset.voice.to_string(),
            "-p".to_string(),
            preset.pitch.to_string(),
            "-s".to_string(),
            words_per_minute(request.speed).to_string(),
            "-w".to_string(),
            request.output_path.to_string_lossy().to_string(),
            "-f".to_string(),
            text_path.to_string_lossy().to_string(),
        ])
    }
}

#[async_trait]
impl SpeechSynthesizer for EspeakSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<(), SpeechError> {
        if request.text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let text_path = request.output_path.with_extension("txt");
        tokio::fs::write(&text_path, &request.text).await?;

        let result = run_process(&self.build_request(request, &text_path)).await;
        if let Err(e) = tokio::fs::remove_file(&text_path).await {
            tracing::debug!(path = %text_path.display(), error = %e, "Failed to remove narration text file");
        }
        result?;

        let size = tokio::fs::metadata(&request.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(SpeechError::EmptyOutput(
                request.output_path.to_string_lossy().to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rate_scales_with_speed() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.5), 88);
    }

    #[test]
    fn rate_is_clamped_to_engine_range() {
        assert_eq!(words_per_minute(0.1), MIN_WORDS_PER_MINUTE);
        assert_eq!(words_per_minute(5.0), MAX_WORDS_PER_MINUTE);
    }

    #[test]
    fn presets_differ_per_voice() {
        let male = VoicePreset::for_voice(VoiceType::Male);
        let child = VoicePreset::for_voice(VoiceType::Child);
        assert_ne!(male.voice, child.voice);
        assert!(child.pitch > male.pitch);
    }

    #[test]
    fn request_uses_preset_and_rate() {
        let synth = EspeakSynthesizer::new("espeak-ng", Duration::from_secs(60));
        let request = SpeechRequest {
            text: "hello".into(),
            voice: VoiceType::Female,
            speed: 1.2,
            output_path: "/s/narration_a1.wav".into(),
        };
        let process = synth.build_request(&request, Path::new("/s/narration_a1.txt"));
        assert_eq!(
            process.args,
            vec![
                "-v",
                "en-us+f3",
                "-p",
                "60",
                "-s",
                "210",
                "-w",
                "/s/narration_a1.wav",
                "-f",
                "/s/narration_a1.txt",
            ]
        );
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_spawning() {
        let synth = EspeakSynthesizer::new("definitely-not-espeak", Duration::from_secs(1));
        let request = SpeechRequest {
            text: "   ".into(),
            voice: VoiceType::Male,
            speed: 1.0,
            output_path: "/nonexistent/out.wav".into(),
        };
        assert_matches!(synth.synthesize(&request).await, Err(SpeechError::EmptyText));
    }

    #[tokio::test]
    async fn engine_that_writes_nothing_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        // `true` accepts any arguments and writes no file.
        let synth = EspeakSynthesizer::new("true", Duration::from_secs(5));
        let request = SpeechRequest {
            text: "some narration".into(),
            voice: VoiceType::Male,
            speed: 1.0,
            output_path: dir.path().join("out.wav"),
        };
        assert_matches!(
            synth.synthesize(&request).await,
            Err(SpeechError::EmptyOutput(_))
        );
        assert!(!dir.path().join("out.txt").exists());
    }
}
