use std::path::PathBuf;
use std::time::Duration;

use explainer_core::poll::PollConfig;
use explainer_core::readiness::StabilityConfig;
use explainer_core::render::RenderQuality;
use serde::Serialize;

/// Scene class the generated code must define and the renderer executes.
pub const DEFAULT_ENTRY_POINT: &str = "ExplainConcept";

/// Delay between attempts: `min(step × attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub step: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            cap: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.cap)
    }
}

/// Executables for the subprocess-backed collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPaths {
    pub manim: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub espeak: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            manim: "manim".into(),
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            espeak: "espeak-ng".into(),
        }
    }
}

/// Pipeline tunables. Constructed once at start-up and shared by every run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Parent of the per-request scratch directories.
    pub scratch_root: PathBuf,

    pub entry_point: String,
    pub render_quality: RenderQuality,
    pub render_timeout: Duration,
    pub min_video_bytes: u64,
    pub min_video_secs: f64,
    /// Size-stability wait applied to rendered and muxed files.
    pub stability: StabilityConfig,

    /// When false, narration and mux are skipped and results are video-only.
    pub narration_enabled: bool,
    /// Interval and budget for the provider's upload-processing poll.
    pub upload_poll: PollConfig,
    pub min_script_chars: usize,
    /// Spoken words per second of video used to size the narration request.
    pub narration_words_per_second: f64,
    pub speech_timeout: Duration,
    pub mux_timeout: Duration,
    pub probe_timeout: Duration,

    pub storage_folder: String,
    pub tools: ToolPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            scratch_root: default_scratch_root(),
            entry_point: DEFAULT_ENTRY_POINT.into(),
            render_quality: RenderQuality::Medium,
            render_timeout: Duration::from_secs(420),
            min_video_bytes: 10 * 1024,
            min_video_secs: 1.0,
            stability: StabilityConfig::default(),
            narration_enabled: true,
            upload_poll: PollConfig::new(Duration::from_secs(2), Duration::from_secs(60)),
            min_script_chars: 50,
            narration_words_per_second: 2.5,
            speech_timeout: Duration::from_secs(120),
            mux_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(30),
            storage_folder: "concept_explanations".into(),
            tools: ToolPaths::default(),
        }
    }
}

fn default_scratch_root() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join("manim_temp"))
        .unwrap_or_else(|_| PathBuf::from("/tmp/manim_temp"))
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(name)
        .map(|v| v.parse().unwrap_or_else(|_| panic!("{name} must be a valid u64")))
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `SCRATCH_ROOT`               | `$HOME/manim_temp`       |
    /// | `PIPELINE_MAX_ATTEMPTS`      | `3`                      |
    /// | `PIPELINE_BACKOFF_STEP_SECS` | `2`                      |
    /// | `PIPELINE_BACKOFF_CAP_SECS`  | `10`                     |
    /// | `RENDER_TIMEOUT_SECS`        | `420`                    |
    /// | `RENDER_QUALITY`             | `medium`                 |
    /// | `NARRATION_ENABLED`          | `true`                   |
    /// | `STORAGE_FOLDER`             | `concept_explanations`   |
    /// | `MANIM_BIN`                  | `manim`                  |
    /// | `FFMPEG_BIN`                 | `ffmpeg`                 |
    /// | `FFPROBE_BIN`                | `ffprobe`                |
    /// | `ESPEAK_BIN`                 | `espeak-ng`              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scratch_root = std::env::var("SCRATCH_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.scratch_root);

        let max_attempts: u32 = std::env::var("PIPELINE_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("PIPELINE_MAX_ATTEMPTS must be a valid u32");
        assert!(max_attempts >= 1, "PIPELINE_MAX_ATTEMPTS must be at least 1");

        let backoff = BackoffPolicy {
            step: env_secs("PIPELINE_BACKOFF_STEP_SECS", 2),
            cap: env_secs("PIPELINE_BACKOFF_CAP_SECS", 10),
        };

        let render_quality = std::env::var("RENDER_QUALITY")
            .map(|q| RenderQuality::from_name(&q).expect("RENDER_QUALITY must be a known preset"))
            .unwrap_or(defaults.render_quality);

        let narration_enabled: bool = std::env::var("NARRATION_ENABLED")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("NARRATION_ENABLED must be true or false");

        let tools = ToolPaths {
            manim: std::env::var("MANIM_BIN").unwrap_or(defaults.tools.manim),
            ffmpeg: std::env::var("FFMPEG_BIN").unwrap_or(defaults.tools.ffmpeg),
            ffprobe: std::env::var("FFPROBE_BIN").unwrap_or(defaults.tools.ffprobe),
            espeak: std::env::var("ESPEAK_BIN").unwrap_or(defaults.tools.espeak),
        };

        Self {
            max_attempts,
            backoff,
            scratch_root,
            render_quality,
            render_timeout: env_secs("RENDER_TIMEOUT_SECS", 420),
            narration_enabled,
            storage_folder: std::env::var("STORAGE_FOLDER").unwrap_or(defaults.storage_folder),
            tools,
            ..defaults
        }
    }
}
