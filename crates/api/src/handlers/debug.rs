//! Diagnostic endpoints under `/debug`.
//!
//! Only non-secret settings are exposed; provider keys never leave their
//! config structs.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use explainer_core::process::{run_process, ProcessRequest};
use explainer_pipeline::config::ToolPaths;
use serde::Serialize;

use crate::state::AppState;

/// Per-tool version check timeout.
const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct DebugConfigResponse {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub backoff_cap_ms: u64,
    pub scratch_root: String,
    pub entry_point: String,
    pub render_quality: &'static str,
    pub render_timeout_secs: u64,
    pub min_video_bytes: u64,
    pub min_video_secs: f64,
    pub narration_enabled: bool,
    pub upload_poll_timeout_secs: u64,
    pub min_script_chars: usize,
    pub speech_timeout_secs: u64,
    pub mux_timeout_secs: u64,
    pub storage_folder: String,
    pub tools: ToolPaths,
    pub request_timeout_secs: u64,
}

/// GET /debug/config
pub async fn config(State(state): State<AppState>) -> Json<DebugConfigResponse> {
    let pipeline = state.pipeline.config();

    Json(DebugConfigResponse {
        max_attempts: pipeline.max_attempts,
        backoff_step_ms: millis(pipeline.backoff.step),
        backoff_cap_ms: millis(pipeline.backoff.cap),
        scratch_root: pipeline.scratch_root.to_string_lossy().to_string(),
        entry_point: pipeline.entry_point.clone(),
        render_quality: pipeline.render_quality.as_str(),
        render_timeout_secs: pipeline.render_timeout.as_secs(),
        min_video_bytes: pipeline.min_video_bytes,
        min_video_secs: pipeline.min_video_secs,
        narration_enabled: pipeline.narration_enabled,
        upload_poll_timeout_secs: pipeline.upload_poll.timeout.as_secs(),
        min_script_chars: pipeline.min_script_chars,
        speech_timeout_secs: pipeline.speech_timeout.as_secs(),
        mux_timeout_secs: pipeline.mux_timeout.as_secs(),
        storage_folder: pipeline.storage_folder.clone(),
        tools: pipeline.tools.clone(),
        request_timeout_secs: state.config.request_timeout_secs,
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Serialize)]
pub struct ToolStatus {
    pub tool: &'static str,
    pub binary: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /debug/tools
///
/// Runs each configured binary's version command and reports the first
/// line of its output.
pub async fn tools(State(state): State<AppState>) -> Json<Vec<ToolStatus>> {
    let tools = &state.pipeline.config().tools;
    let checks = [
        ("manim", tools.manim.as_str(), "--version"),
        ("ffmpeg", tools.ffmpeg.as_str(), "-version"),
        ("ffprobe", tools.ffprobe.as_str(), "-version"),
        ("espeak", tools.espeak.as_str(), "--version"),
    ];

    let mut statuses = Vec::with_capacity(checks.len());
    for (tool, binary, flag) in checks {
        statuses.push(check_tool(tool, binary, flag).await);
    }
    Json(statuses)
}

async fn check_tool(tool: &'static str, binary: &str, flag: &str) -> ToolStatus {
    let request = ProcessRequest::new(binary, TOOL_CHECK_TIMEOUT).arg(flag);

    match run_process(&request).await {
        Ok(output) => {
            let text = if output.stdout.trim().is_empty() {
                &output.stderr
            } else {
                &output.stdout
            };
            ToolStatus {
                tool,
                binary: binary.to_string(),
                available: true,
                version: text.lines().next().map(|l| l.trim().to_string()),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(tool, binary, error = %e, "Tool check failed");
            ToolStatus {
                tool,
                binary: binary.to_string(),
                available: false,
                version: None,
                error: Some(e.diagnostics()),
            }
        }
    }
}
