//! FFmpeg/FFprobe media toolkit.
//!
//! Wraps the `ffprobe` and `ffmpeg` binaries behind the [`MediaToolkit`]
//! trait: duration probing for render validation and audio/video muxing
//! with duration reconciliation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::process::{run_process, ProcessError, ProcessRequest};

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("media file not found: {0}")]
    MediaNotFound(String),

    #[error("no usable duration reported for {0}")]
    NoDuration(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Mux job description
// ---------------------------------------------------------------------------

/// How the audio track is reconciled with the video length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MuxStrategy {
    /// Pad short audio with silence and trim long audio so the output is
    /// exactly `target_secs` long.
    PadToDuration { target_secs: f64 },
    /// Hard-cap the output at `cap_secs` (the shorter of the two inputs).
    HardCap { cap_secs: f64 },
}

/// One muxing invocation: video stream copied, audio stream encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxJob {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    pub strategy: MuxStrategy,
}

/// Media probe + muxer collaborator.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, FfmpegError>;

    /// Combine one video and one audio stream into `job.output_path`.
    async fn mux(&self, job: &MuxJob) -> Result<(), FfmpegError>;
}

// ---------------------------------------------------------------------------
// Command-line implementation
// ---------------------------------------------------------------------------

/// [`MediaToolkit`] backed by the `ffprobe` / `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    probe_timeout: Duration,
    mux_timeout: Duration,
}

impl FfmpegToolkit {
    pub fn new(
        ffmpeg_bin: impl Into<String>,
        ffprobe_bin: impl Into<String>,
        probe_timeout: Duration,
        mux_timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
            probe_timeout,
            mux_timeout,
        }
    }

    /// Run `ffprobe` on a media file and return the parsed JSON output.
    pub async fn probe(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(FfmpegError::MediaNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let request = ProcessRequest::new(&self.ffprobe_bin, self.probe_timeout)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path.to_string_lossy());

        let output = run_process(&request).await?;
        serde_json::from_str::<FfprobeOutput>(&output.stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {}", output.stdout)))
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<f64, FfmpegError> {
        let probe = self.probe(path).await?;
        parse_duration(&probe)
            .ok_or_else(|| FfmpegError::NoDuration(path.to_string_lossy().to_string()))
    }

    async fn mux(&self, job: &MuxJob) -> Result<(), FfmpegError> {
        let request =
            ProcessRequest::new(&self.ffmpeg_bin, self.mux_timeout).args(build_mux_args(job));
        run_process(&request).await?;
        Ok(())
    }
}

/// Build the ffmpeg argument list for a mux job.
///
/// The video stream is always copied; only the audio stream is encoded.
pub fn build_mux_args(job: &MuxJob) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        job.video_path.to_string_lossy().to_string(),
        "-i".into(),
        job.audio_path.to_string_lossy().to_string(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
    ];

    match job.strategy {
        MuxStrategy::PadToDuration { target_secs } => {
            args.extend([
                "-b:a".into(),
                "192k".into(),
                "-af".into(),
                "apad".into(),
                "-t".into(),
                format!("{target_secs:.3}"),
            ]);
        }
        MuxStrategy::HardCap { cap_secs } => {
            args.extend(["-t".into(), format!("{cap_secs:.3}")]);
        }
    }

    args.push(job.output_path.to_string_lossy().to_string());
    args
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first stream of the given codec type.
fn first_stream<'a>(probe: &'a FfprobeOutput, codec_type: &str) -> Option<&'a FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(codec_type))
}

/// Parse the media duration in seconds from ffprobe output.
///
/// Tries the format-level duration first, then the first video stream,
/// then the first audio stream. Non-positive values are ignored.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    let positive = |d: &Option<String>| {
        d.as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| *secs > 0.0)
    };

    positive(&probe.format.duration)
        .or_else(|| first_stream(probe, "video").and_then(|s| positive(&s.duration)))
        .or_else(|| first_stream(probe, "audio").and_then(|s| positive(&s.duration)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: i32, codec_type: &str, duration: Option<&str>) -> FfprobeStream {
        FfprobeStream {
            index,
            codec_name: None,
            codec_type: Some(codec_type.into()),
            duration: duration.map(Into::into),
        }
    }

    fn format(duration: Option<&str>) -> FfprobeFormat {
        FfprobeFormat {
            duration: duration.map(Into::into),
            size: None,
            format_name: None,
        }
    }

    #[test]
    fn test_parse_duration_from_format() {
        let probe = FfprobeOutput {
            streams: vec![],
            format: format(Some("45.2")),
        };
        assert!((parse_duration(&probe).unwrap() - 45.2).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_from_video_stream() {
        let probe = FfprobeOutput {
            streams: vec![stream(0, "video", Some("60.0"))],
            format: format(None),
        };
        assert!((parse_duration(&probe).unwrap() - 60.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_from_audio_stream() {
        let probe = FfprobeOutput {
            streams: vec![stream(0, "audio", Some("12.5"))],
            format: format(Some("N/A")),
        };
        assert!((parse_duration(&probe).unwrap() - 12.5).abs() < 0.001);
    }

    #[test]
    fn test_parse_duration_missing() {
        let probe = FfprobeOutput {
            streams: vec![stream(0, "video", None)],
            format: format(Some("0.0")),
        };
        assert_eq!(parse_duration(&probe), None);
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = r#"{
            "streams": [{"index": 0, "codec_name": "h264", "codec_type": "video", "duration": "44.9"}],
            "format": {"duration": "45.000000", "size": "2097152", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!((parse_duration(&probe).unwrap() - 45.0).abs() < 0.001);
    }

    #[test]
    fn test_pad_args_copy_video_and_pad_audio() {
        let job = MuxJob {
            video_path: "/s/v.mp4".into(),
            audio_path: "/s/a.wav".into(),
            output_path: "/s/out.mp4".into(),
            strategy: MuxStrategy::PadToDuration { target_secs: 45.0 },
        };
        let args = build_mux_args(&job);
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -i /s/v.mp4 -i /s/a.wav"));
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-af apad -t 45.000"));
        assert_eq!(args.last().map(String::as_str), Some("/s/out.mp4"));
    }

    #[test]
    fn test_hard_cap_args_have_no_padding() {
        let job = MuxJob {
            video_path: "/s/v.mp4".into(),
            audio_path: "/s/a.wav".into(),
            output_path: "/s/out.mp4".into(),
            strategy: MuxStrategy::HardCap { cap_secs: 38.25 },
        };
        let joined = build_mux_args(&job).join(" ");
        assert!(!joined.contains("apad"));
        assert!(joined.contains("-t 38.250"));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let toolkit = FfmpegToolkit::new(
            "ffmpeg",
            "ffprobe",
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let result = toolkit
            .probe_duration(Path::new("/nonexistent/clip.mp4"))
            .await;
        assert!(matches!(result, Err(FfmpegError::MediaNotFound(_))));
    }
}
