//! Animation renderer collaborator.
//!
//! [`ManimRenderer`] compiles a generated scene script into a video by
//! running the `manim` command line. Locating and validating the produced
//! file is the caller's job; the renderer only reports how the process
//! exited.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::process::{run_process, ProcessError, ProcessOutput, ProcessRequest};

/// Renderer quality preset.
///
/// Each preset maps to a command-line flag and to the directory name the
/// renderer writes its output under (`<resolution>p<fps>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderQuality {
    Low,
    #[default]
    Medium,
    High,
    Production,
    FourK,
}

impl RenderQuality {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Low => "-ql",
            Self::Medium => "-qm",
            Self::High => "-qh",
            Self::Production => "-qp",
            Self::FourK => "-qk",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Production => "production",
            Self::FourK => "fourk",
        }
    }

    /// Output sub-directory for this preset, e.g. `720p30`.
    pub fn output_dir_name(self) -> &'static str {
        match self {
            Self::Low => "480p15",
            Self::Medium => "720p30",
            Self::High => "1080p60",
            Self::Production => "1440p60",
            Self::FourK => "2160p60",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "medium" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            "production" | "p" => Ok(Self::Production),
            "fourk" | "4k" | "k" => Ok(Self::FourK),
            other => Err(CoreError::Validation(format!(
                "Unknown render quality '{other}'. Must be one of: low, medium, high, production, fourk"
            ))),
        }
    }
}

/// One render invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    /// Scene source file.
    pub script_path: PathBuf,
    /// Root directory the renderer writes its media tree into.
    pub media_dir: PathBuf,
    /// Scene class to execute.
    pub entry_point: String,
    pub quality: RenderQuality,
    pub timeout: Duration,
}

impl RenderJob {
    /// Where the renderer writes the final video by convention:
    /// `<media>/videos/<script stem>/<quality dir>/<entry point>.mp4`.
    pub fn expected_output(&self) -> PathBuf {
        self.media_dir
            .join("videos")
            .join(script_stem(&self.script_path))
            .join(self.quality.output_dir_name())
            .join(format!("{}.mp4", self.entry_point))
    }
}

/// File stem of a script path, or an empty string if it has none.
pub fn script_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Compiles a source script into a video artifact.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> Result<ProcessOutput, ProcessError>;
}

/// [`Renderer`] backed by the `manim` command line.
#[derive(Debug, Clone)]
pub struct ManimRenderer {
    binary: String,
}

impl ManimRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the process invocation for a job. The working directory is the
    /// script's directory so relative asset paths inside generated code
    /// resolve next to the script.
    pub fn build_request(&self, job: &RenderJob) -> ProcessRequest {
        let mut request = ProcessRequest::new(&self.binary, job.timeout)
            .arg(job.quality.flag())
            .arg("--media_dir")
            .arg(job.media_dir.to_string_lossy())
            .arg(job.script_path.to_string_lossy())
            .arg(&job.entry_point);

        if let Some(parent) = job.script_path.parent() {
            request = request.working_directory(parent);
        }
        request
    }
}

#[async_trait]
impl Renderer for ManimRenderer {
    async fn render(&self, job: &RenderJob) -> Result<ProcessOutput, ProcessError> {
        run_process(&self.build_request(job)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RenderJob {
        RenderJob {
            script_path: "/scratch/req_1/concept_ab12_a1.py".into(),
            media_dir: "/scratch/req_1/media_a1".into(),
            entry_point: "ExplainConcept".into(),
            quality: RenderQuality::Medium,
            timeout: Duration::from_secs(420),
        }
    }

    #[test]
    fn expected_output_follows_renderer_convention() {
        assert_eq!(
            job().expected_output(),
            PathBuf::from("/scratch/req_1/media_a1/videos/concept_ab12_a1/720p30/ExplainConcept.mp4")
        );
    }

    #[test]
    fn request_arguments_and_working_directory() {
        let request = ManimRenderer::new("manim").build_request(&job());
        assert_eq!(request.program, "manim");
        assert_eq!(
            request.args,
            vec![
                "-qm",
                "--media_dir",
                "/scratch/req_1/media_a1",
                "/scratch/req_1/concept_ab12_a1.py",
                "ExplainConcept",
            ]
        );
        assert_eq!(
            request.working_directory,
            Some(PathBuf::from("/scratch/req_1"))
        );
    }

    #[test]
    fn quality_names_parse() {
        assert_eq!(RenderQuality::from_name("high").unwrap(), RenderQuality::High);
        assert_eq!(RenderQuality::from_name("4K").unwrap(), RenderQuality::FourK);
        assert!(RenderQuality::from_name("ultra").is_err());
    }

    #[test]
    fn quality_dirs_match_flags() {
        assert_eq!(RenderQuality::Low.output_dir_name(), "480p15");
        assert_eq!(RenderQuality::High.flag(), "-qh");
    }

    #[tokio::test]
    async fn failing_binary_reports_exit_status() {
        // `false` ignores its arguments and exits 1.
        let renderer = ManimRenderer::new("false");
        let result = renderer.render(&job()).await;
        // The working directory does not exist, so either spawn or exit fails.
        assert!(result.is_err());
    }
}
