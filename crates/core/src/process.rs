//! Shared subprocess management utilities.
//!
//! Provides [`run_process`], the common subprocess execution logic used by
//! the renderer, the media toolkit and the speech synthesizer. Each caller
//! describes the invocation with a [`ProcessRequest`]; spawning, output
//! capture and timeout handling live here.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (4 MiB).
///
/// Renderers can be extremely chatty (progress bars on stderr); output
/// beyond this limit is discarded.
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Maximum number of characters kept by [`ProcessError::diagnostics`].
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// Description of a single external program invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed verbatim (no shell interpolation).
    pub args: Vec<String>,
    /// Working directory for the child process (uses current dir if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Captured output from a successful process run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Errors that can occur while running an external process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be spawned (missing binary, permissions).
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its timeout and was killed.
    #[error("'{program}' timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    /// The process ran but exited unsuccessfully (`-1` if killed by signal).
    #[error("'{program}' failed with exit code {exit_code}: {}", tail(.stderr))]
    ExitStatus {
        program: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Waiting on the child failed.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Collaborator diagnostics suitable for logging and error messages:
    /// the tail of stderr (or stdout when stderr is empty) for failed runs,
    /// the error description otherwise.
    pub fn diagnostics(&self) -> String {
        match self {
            Self::ExitStatus { stdout, stderr, .. } => {
                let source = if stderr.trim().is_empty() { stdout } else { stderr };
                tail(source).to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Last [`DIAGNOSTIC_TAIL_CHARS`] characters of `text`.
fn tail(text: &str) -> &str {
    let trimmed = text.trim_end();
    let count = trimmed.chars().count();
    if count <= DIAGNOSTIC_TAIL_CHARS {
        return trimmed;
    }
    let skip = count - DIAGNOSTIC_TAIL_CHARS;
    let start = trimmed
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &trimmed[start..]
}

/// Spawn the requested program, capture stdout/stderr, and enforce the
/// configured timeout.
///
/// A non-zero exit is reported as [`ProcessError::ExitStatus`]. The child is
/// spawned with `kill_on_drop(true)`, so dropping the returned future (request
/// cancellation, timeout) terminates the process.
pub async fn run_process(request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &request.working_directory {
        cmd.current_dir(dir);
    }

    tracing::debug!(
        program = %request.program,
        args = ?request.args,
        timeout_secs = request.timeout.as_secs(),
        "Spawning process",
    );

    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: request.program.clone(),
        source,
    })?;

    // Read stdout/stderr in spawned tasks so we can still call
    // `child.wait()` (which borrows `&mut child`).
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = tokio::time::timeout(request.timeout, child.wait()).await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let status = match wait_result {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(ProcessError::Io {
                program: request.program.clone(),
                source,
            })
        }
        Err(_elapsed) => {
            // Explicit kill so the pipes close and the reader tasks finish.
            let _ = child.kill().await;
            return Err(ProcessError::Timeout {
                program: request.program.clone(),
                elapsed_ms,
            });
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
    let exit_code = status.code().unwrap_or(-1);

    if !status.success() {
        return Err(ProcessError::ExitStatus {
            program: request.program.clone(),
            exit_code,
            stdout,
            stderr,
        });
    }

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code,
        duration_ms: elapsed_ms,
    })
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
