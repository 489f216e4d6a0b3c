//! In-memory stand-ins for every pipeline collaborator.
//!
//! The renderer, speech synthesizer and media toolkit share a
//! [`MediaRegistry`] so that a file "rendered" with a given duration probes
//! back as that duration, and a mux output probes as its target length.
//! Behaviour can be changed after construction through the `set_*`
//! methods; every stub records the calls it received.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use explainer_core::ffmpeg::{FfmpegError, MediaToolkit, MuxJob, MuxStrategy};
use explainer_core::poll::PollConfig;
use explainer_core::process::{ProcessError, ProcessOutput};
use explainer_core::readiness::StabilityConfig;
use explainer_core::render::{RenderJob, Renderer};
use explainer_core::speech::{SpeechError, SpeechRequest, SpeechSynthesizer};
use explainer_genai::{
    FileState, GenAiError, GenerativeModel, RemoteFile, StructuredRequest,
};
use explainer_storage::{ArtifactStore, ResourceKind, StorageError, StoredArtifact};

use crate::config::{BackoffPolicy, PipelineConfig};
use crate::orchestrator::Collaborators;

/// Default generated scene used by [`StubModel`].
pub const SAMPLE_CODE: &str = "from manim import *\n\n\
class ExplainConcept(Scene):\n    \
def construct(self):\n        \
self.play(Write(MathTex(r\"a^2 + b^2 = c^2\")))\n";

pub const SAMPLE_EXPLANATION: &str =
    "The visualization draws a right triangle and squares on each side to show a² + b² = c².";

pub const SAMPLE_NARRATION: &str = "Here we see a right triangle. Squares grow from each side, \
and the two smaller areas together exactly fill the largest square.";

/// Pipeline configuration with millisecond-scale waits for tests.
pub fn fast_config(scratch_root: &Path) -> PipelineConfig {
    PipelineConfig {
        scratch_root: scratch_root.to_path_buf(),
        backoff: BackoffPolicy {
            step: Duration::from_millis(20),
            cap: Duration::from_millis(200),
        },
        stability: StabilityConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
            required_stable_checks: 1,
        },
        upload_poll: PollConfig::new(Duration::from_millis(5), Duration::from_millis(200)),
        ..PipelineConfig::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Known media durations, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MediaRegistry {
    durations: Arc<Mutex<HashMap<PathBuf, f64>>>,
}

impl MediaRegistry {
    pub fn set(&self, path: impl Into<PathBuf>, secs: f64) {
        lock(&self.durations).insert(path.into(), secs);
    }

    pub fn get(&self, path: &Path) -> Option<f64> {
        lock(&self.durations).get(path).copied()
    }
}

fn write_bytes(path: &Path, len: usize) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, vec![0u8; len])
}

// ---------------------------------------------------------------------------
// Generative model
// ---------------------------------------------------------------------------

/// Scripted [`GenerativeModel`].
///
/// Requests whose schema asks for `python_code` get the code response;
/// everything else gets the narration response.
#[derive(Default)]
pub struct StubModel {
    code_response: Mutex<Option<Result<String, String>>>,
    narration_response: Mutex<Option<Result<String, String>>>,
    upload_error: Mutex<Option<String>>,
    states: Mutex<VecDeque<FileState>>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    delete_delay: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<StructuredRequest>>,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text returned for code generation; `Err` becomes a provider error.
    pub fn set_code_response(&self, response: Result<String, String>) {
        *lock(&self.code_response) = Some(response);
    }

    /// Raw text returned for narration; `Err` becomes a provider error.
    pub fn set_narration_response(&self, response: Result<String, String>) {
        *lock(&self.narration_response) = Some(response);
    }

    pub fn set_narration_text(&self, narration: &str) {
        self.set_narration_response(Ok(serde_json::json!({ "narration": narration }).to_string()));
    }

    /// Make every `delete_file` call take `delay` before it completes.
    pub fn set_delete_delay(&self, delay: Duration) {
        *lock(&self.delete_delay) = Some(delay);
    }

    pub fn fail_uploads(&self, message: &str) {
        *lock(&self.upload_error) = Some(message.to_string());
    }

    /// States reported by successive `file_state` calls; `ACTIVE` once
    /// exhausted.
    pub fn set_file_states(&self, states: impl IntoIterator<Item = FileState>) {
        *lock(&self.states) = states.into_iter().collect();
    }

    pub fn uploads(&self) -> Vec<String> {
        lock(&self.uploads).clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        lock(&self.deletes).clone()
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String, GenAiError> {
        lock(&self.prompts).push(request.clone());
        let wants_code = request
            .schema
            .string_fields
            .iter()
            .any(|f| f == "python_code");

        let configured = if wants_code {
            lock(&self.code_response).clone()
        } else {
            lock(&self.narration_response).clone()
        };
        let response = configured.unwrap_or_else(|| {
            Ok(if wants_code {
                serde_json::json!({
                    "python_code": SAMPLE_CODE,
                    "explanation": SAMPLE_EXPLANATION,
                })
                .to_string()
            } else {
                serde_json::json!({ "narration": SAMPLE_NARRATION }).to_string()
            })
        });
        response.map_err(GenAiError::EmptyResponse)
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, GenAiError> {
        if let Some(message) = lock(&self.upload_error).clone() {
            return Err(GenAiError::ApiError {
                status: 500,
                body: message,
            });
        }
        let mut uploads = lock(&self.uploads);
        let name = format!("files/stub-{}", uploads.len() + 1);
        uploads.push(name.clone());
        Ok(RemoteFile {
            uri: format!("https://model.test/v1beta/{name}"),
            name,
            mime_type: mime_type.to_string(),
            state: if path.exists() {
                FileState::Processing
            } else {
                FileState::Failed
            },
        })
    }

    async fn file_state(&self, _name: &str) -> Result<FileState, GenAiError> {
        Ok(lock(&self.states).pop_front().unwrap_or(FileState::Active))
    }

    async fn delete_file(&self, name: &str) -> Result<(), GenAiError> {
        let delay = *lock(&self.delete_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.deletes).push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RenderBehavior {
    /// Write a file of `size_bytes` at the conventional output path.
    Succeed { size_bytes: usize, duration_secs: f64 },
    /// Write the file under a different quality directory.
    SucceedElsewhere { size_bytes: usize, duration_secs: f64 },
    /// Exit cleanly without producing a video.
    NoOutput,
    /// Exit non-zero with `stderr`.
    Fail { stderr: String },
}

pub struct StubRenderer {
    registry: MediaRegistry,
    behavior: Mutex<RenderBehavior>,
    calls: Mutex<Vec<(Instant, RenderJob)>>,
}

impl StubRenderer {
    pub fn new(registry: MediaRegistry) -> Self {
        Self {
            registry,
            behavior: Mutex::new(RenderBehavior::Succeed {
                size_bytes: 64 * 1024,
                duration_secs: 45.0,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: RenderBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn jobs(&self) -> Vec<RenderJob> {
        lock(&self.calls).iter().map(|(_, j)| j.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.calls).iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, job: &RenderJob) -> Result<ProcessOutput, ProcessError> {
        lock(&self.calls).push((Instant::now(), job.clone()));
        let behavior = lock(&self.behavior).clone();

        let io_err = |source: std::io::Error| ProcessError::Io {
            program: "stub-renderer".into(),
            source,
        };
        let written = |path: PathBuf,
                       size: usize,
                       secs: f64|
         -> Result<ProcessOutput, ProcessError> {
            write_bytes(&path, size).map_err(io_err)?;
            self.registry.set(path, secs);
            Ok(ProcessOutput {
                stdout: "rendered".into(),
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 1,
            })
        };

        match behavior {
            RenderBehavior::Succeed {
                size_bytes,
                duration_secs,
            } => written(job.expected_output(), size_bytes, duration_secs),
            RenderBehavior::SucceedElsewhere {
                size_bytes,
                duration_secs,
            } => {
                let path = job
                    .media_dir
                    .join("videos")
                    .join(explainer_core::render::script_stem(&job.script_path))
                    .join("1080p60")
                    .join(format!("{}.mp4", job.entry_point));
                written(path, size_bytes, duration_secs)
            }
            RenderBehavior::NoOutput => Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 1,
            }),
            RenderBehavior::Fail { stderr } => Err(ProcessError::ExitStatus {
                program: "manim".into(),
                exit_code: 1,
                stdout: String::new(),
                stderr,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Media toolkit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxBehavior {
    Succeed,
    /// The padded variant fails; the capped fallback works.
    FailPrimary,
    FailAll,
}

pub struct StubMedia {
    registry: MediaRegistry,
    behavior: Mutex<MuxBehavior>,
    jobs: Mutex<Vec<MuxJob>>,
}

impl StubMedia {
    pub fn new(registry: MediaRegistry) -> Self {
        Self {
            registry,
            behavior: Mutex::new(MuxBehavior::Succeed),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: MuxBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn jobs(&self) -> Vec<MuxJob> {
        lock(&self.jobs).clone()
    }
}

#[async_trait]
impl MediaToolkit for StubMedia {
    async fn probe_duration(&self, path: &Path) -> Result<f64, FfmpegError> {
        if !path.exists() {
            return Err(FfmpegError::MediaNotFound(path.to_string_lossy().to_string()));
        }
        self.registry
            .get(path)
            .ok_or_else(|| FfmpegError::NoDuration(path.to_string_lossy().to_string()))
    }

    async fn mux(&self, job: &MuxJob) -> Result<(), FfmpegError> {
        lock(&self.jobs).push(job.clone());
        let behavior = *lock(&self.behavior);

        let (fails, secs) = match job.strategy {
            MuxStrategy::PadToDuration { target_secs } => {
                (behavior != MuxBehavior::Succeed, target_secs)
            }
            MuxStrategy::HardCap { cap_secs } => (behavior == MuxBehavior::FailAll, cap_secs),
        };
        if fails {
            return Err(FfmpegError::ParseError("stub muxer failure".into()));
        }

        let video = std::fs::read(&job.video_path)
            .map_err(|e| FfmpegError::MediaNotFound(format!("{}: {e}", job.video_path.display())))?;
        let audio_len = std::fs::metadata(&job.audio_path)
            .map(|m| m.len() as usize)
            .map_err(|e| FfmpegError::MediaNotFound(format!("{}: {e}", job.audio_path.display())))?;
        let mut bytes = video;
        bytes.extend(std::iter::repeat(1u8).take(audio_len));
        std::fs::write(&job.output_path, bytes)
            .map_err(|e| FfmpegError::ParseError(e.to_string()))?;
        self.registry.set(&job.output_path, secs);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

pub struct StubSpeech {
    registry: MediaRegistry,
    duration_secs: Mutex<Option<f64>>,
    requests: Mutex<Vec<SpeechRequest>>,
}

impl StubSpeech {
    pub fn new(registry: MediaRegistry) -> Self {
        Self {
            registry,
            duration_secs: Mutex::new(Some(40.0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Length of produced audio, or `None` to make synthesis fail.
    pub fn set_duration(&self, secs: Option<f64>) {
        *lock(&self.duration_secs) = secs;
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<(), SpeechError> {
        lock(&self.requests).push(request.clone());
        let Some(secs) = *lock(&self.duration_secs) else {
            return Err(SpeechError::EmptyOutput(
                request.output_path.to_string_lossy().to_string(),
            ));
        };
        write_bytes(&request.output_path, 4096)?;
        self.registry.set(&request.output_path, secs);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubStore {
    fail_uploads: Mutex<bool>,
    destroy_result: Mutex<Option<String>>,
    uploads: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    destroys: Mutex<Vec<(String, ResourceKind)>>,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        *lock(&self.fail_uploads) = fail;
    }

    /// Result string the provider reports for destroys; anything other
    /// than `ok` fails.
    pub fn set_destroy_result(&self, result: &str) {
        *lock(&self.destroy_result) = Some(result.to_string());
    }

    /// Paths and contents of every uploaded file, read at upload time.
    pub fn uploads(&self) -> Vec<(PathBuf, Vec<u8>)> {
        lock(&self.uploads).clone()
    }

    pub fn destroys(&self) -> Vec<(String, ResourceKind)> {
        lock(&self.destroys).clone()
    }
}

#[async_trait]
impl ArtifactStore for StubStore {
    async fn upload(
        &self,
        path: &Path,
        kind: ResourceKind,
        folder: &str,
    ) -> Result<StoredArtifact, StorageError> {
        if *lock(&self.fail_uploads) {
            return Err(StorageError::ApiError {
                status: 503,
                body: "stub storage unavailable".into(),
            });
        }
        let bytes = std::fs::read(path)?;
        lock(&self.uploads).push((path.to_path_buf(), bytes));

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let public_id = format!("{folder}/{stem}");
        Ok(StoredArtifact {
            url: format!(
                "https://res.cloudinary.com/demo/{}/upload/v1700000000/{public_id}.mp4",
                kind.as_str()
            ),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str, kind: ResourceKind) -> Result<(), StorageError> {
        lock(&self.destroys).push((public_id.to_string(), kind));
        match lock(&self.destroy_result).clone() {
            Some(result) if result != "ok" => Err(StorageError::DestroyFailed {
                public_id: public_id.to_string(),
                result,
            }),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Every stub, wired to one shared [`MediaRegistry`].
pub struct Stubs {
    pub registry: MediaRegistry,
    pub model: Arc<StubModel>,
    pub renderer: Arc<StubRenderer>,
    pub media: Arc<StubMedia>,
    pub speech: Arc<StubSpeech>,
    pub store: Arc<StubStore>,
}

impl Default for Stubs {
    fn default() -> Self {
        Self::new()
    }
}

impl Stubs {
    pub fn new() -> Self {
        let registry = MediaRegistry::default();
        Self {
            model: Arc::new(StubModel::new()),
            renderer: Arc::new(StubRenderer::new(registry.clone())),
            media: Arc::new(StubMedia::new(registry.clone())),
            speech: Arc::new(StubSpeech::new(registry.clone())),
            store: Arc::new(StubStore::new()),
            registry,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            model: self.model.clone(),
            renderer: self.renderer.clone(),
            media: self.media.clone(),
            speech: self.speech.clone(),
            store: self.store.clone(),
        }
    }
}
