//! Render stage: scene source in, validated video file out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use explainer_core::ffmpeg::MediaToolkit;
use explainer_core::readiness::wait_for_stable_file;
use explainer_core::render::{script_stem, RenderJob, Renderer};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::{AttemptScope, RequestContext};
use crate::error::PipelineError;

/// A rendered video that passed size and duration validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: f64,
}

const PARTIAL_MOVIE_DIR: &str = "partial_movie_files";

/// Find the renderer's output for `job`.
///
/// Tries the conventional path first, then any MP4 under the script's
/// output directory, then any MP4 anywhere under the media tree. Partial
/// segment files are never returned.
pub fn locate_video(job: &RenderJob) -> Option<PathBuf> {
    let expected = job.expected_output();
    if expected.is_file() {
        return Some(expected);
    }

    let videos = job.media_dir.join("videos");
    let escaped_root = glob::Pattern::escape(&videos.to_string_lossy());
    let escaped_stem = glob::Pattern::escape(&script_stem(&job.script_path));

    let patterns = [
        format!("{escaped_root}/{escaped_stem}/*/*.mp4"),
        format!("{escaped_root}/**/*.mp4"),
    ];

    for pattern in &patterns {
        let Ok(paths) = glob::glob(pattern) else {
            continue;
        };
        let mut found: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|p| !p.components().any(|c| c.as_os_str() == PARTIAL_MOVIE_DIR))
            .filter(|p| p.is_file())
            .collect();
        found.sort();
        if let Some(first) = found.into_iter().next() {
            tracing::debug!(pattern = %pattern, path = %first.display(), "Video found by fallback search");
            return Some(first);
        }
    }
    None
}

pub struct RenderStage {
    renderer: Arc<dyn Renderer>,
    media: Arc<dyn MediaToolkit>,
    config: Arc<PipelineConfig>,
}

impl RenderStage {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        media: Arc<dyn MediaToolkit>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            renderer,
            media,
            config,
        }
    }

    /// Build the job for this attempt. The script and media paths are
    /// unique per request and attempt.
    pub fn job_for(&self, ctx: &RequestContext, attempt: u32) -> RenderJob {
        RenderJob {
            script_path: ctx.scratch_path(&format!("concept_{}_a{attempt}.py", ctx.short_id())),
            media_dir: ctx.scratch_path(&format!("media_a{attempt}")),
            entry_point: self.config.entry_point.clone(),
            quality: self.config.render_quality,
            timeout: self.config.render_timeout,
        }
    }

    pub async fn run(
        &self,
        source_code: &str,
        ctx: &RequestContext,
        scope: &mut AttemptScope,
        cancel: &CancellationToken,
    ) -> Result<RenderedVideo, PipelineError> {
        let job = self.job_for(ctx, scope.attempt());

        scope.register_file(&job.script_path);
        tokio::fs::write(&job.script_path, source_code)
            .await
            .map_err(|e| PipelineError::scratch("writing scene script", e))?;

        scope.register_dir(&job.media_dir);
        tokio::fs::create_dir_all(&job.media_dir)
            .await
            .map_err(|e| PipelineError::scratch("creating media directory", e))?;

        let output = self
            .renderer
            .render(&job)
            .await
            .map_err(|e| PipelineError::Render(e.to_string()))?;
        tracing::debug!(duration_ms = output.duration_ms, "Renderer exited cleanly");

        let path = locate_video(&job)
            .ok_or_else(|| PipelineError::Render("artifact not found".into()))?;

        self.validate(&path, cancel).await
    }

    async fn validate(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<RenderedVideo, PipelineError> {
        let size_bytes = wait_for_stable_file(path, self.config.stability, cancel)
            .await
            .map_err(|e| PipelineError::Render(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if size_bytes < self.config.min_video_bytes {
            return Err(PipelineError::Render(format!(
                "video is {size_bytes} bytes, below the {} byte minimum",
                self.config.min_video_bytes
            )));
        }

        let duration_secs = self
            .media
            .probe_duration(path)
            .await
            .map_err(|e| PipelineError::Render(format!("could not measure video: {e}")))?;

        if duration_secs < self.config.min_video_secs {
            return Err(PipelineError::Render(format!(
                "video is {duration_secs:.2}s, below the {:.2}s minimum",
                self.config.min_video_secs
            )));
        }

        tracing::info!(
            path = %path.display(),
            size_bytes,
            duration_secs,
            "Rendered video validated",
        );
        Ok(RenderedVideo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use explainer_core::render::RenderQuality;

    use super::*;

    fn job(media: &Path) -> RenderJob {
        RenderJob {
            script_path: media.with_file_name("concept_ab12cd34_a1.py"),
            media_dir: media.to_path_buf(),
            entry_point: "ExplainConcept".into(),
            quality: RenderQuality::Medium,
            timeout: Duration::from_secs(1),
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"video").unwrap();
    }

    #[test]
    fn conventional_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir.path().join("media_a1"));
        touch(&job.expected_output());
        touch(&job.media_dir.join("videos/concept_ab12cd34_a1/480p15/Other.mp4"));
        assert_eq!(locate_video(&job), Some(job.expected_output()));
    }

    #[test]
    fn other_quality_dir_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir.path().join("media_a1"));
        let other = job.media_dir.join("videos/concept_ab12cd34_a1/1080p60/ExplainConcept.mp4");
        touch(&other);
        assert_eq!(locate_video(&job), Some(other));
    }

    #[test]
    fn broad_search_skips_partial_segments() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir.path().join("media_a1"));
        touch(&job
            .media_dir
            .join("videos/renamed/720p30/partial_movie_files/ExplainConcept/00000.mp4"));
        assert_eq!(locate_video(&job), None);

        let real = job.media_dir.join("videos/renamed/720p30/ExplainConcept.mp4");
        touch(&real);
        assert_eq!(locate_video(&job), Some(real));
    }
}
