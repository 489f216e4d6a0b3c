//! Per-request and per-attempt scratch resources.
//!
//! A [`RequestContext`] owns `<scratch_root>/req_<uuid>` for the lifetime of
//! one run. Each attempt gets an [`AttemptScope`] that records every file
//! and directory the attempt creates and removes them in one
//! [`AttemptScope::release`] call. Both fall back to synchronous removal in
//! `Drop` when a run is cancelled before reaching its cleanup.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::PipelineError;

/// Identity and scratch namespace of one pipeline run.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    scratch_dir: PathBuf,
    attempt: u32,
    closed: bool,
}

impl RequestContext {
    /// Allocate a fresh request id and create its scratch directory.
    pub async fn create(scratch_root: &Path) -> Result<Self, PipelineError> {
        let request_id = Uuid::new_v4();
        let scratch_dir = scratch_root.join(format!("req_{request_id}"));
        tokio::fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|e| PipelineError::scratch("creating request scratch directory", e))?;

        Ok(Self {
            request_id,
            scratch_dir,
            attempt: 0,
            closed: false,
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// First eight hex digits of the request id, used in file names.
    pub fn short_id(&self) -> String {
        self.request_id.simple().to_string()[..8].to_string()
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Path of `name` inside the scratch directory.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(name)
    }

    /// Current attempt number (1-based; 0 before the first attempt).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance to attempt `attempt` and hand out its empty scope.
    pub fn begin_attempt(&mut self, attempt: u32) -> AttemptScope {
        self.attempt = attempt;
        AttemptScope::new(attempt)
    }

    /// Remove the scratch directory. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Err(e) = remove_dir(&self.scratch_dir).await {
            tracing::warn!(
                request_id = %self.request_id,
                path = %self.scratch_dir.display(),
                error = %e,
                "Failed to remove request scratch directory",
            );
        }
        self.closed = true;
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = remove_dir_blocking(&self.scratch_dir) {
                tracing::warn!(
                    request_id = %self.request_id,
                    error = %e,
                    "Failed to remove request scratch directory on drop",
                );
            }
        }
    }
}

/// A scratch path owned by an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScratchResource {
    File(PathBuf),
    Dir(PathBuf),
}

impl ScratchResource {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(p) | Self::Dir(p) => p,
        }
    }

    async fn remove(&self) -> io::Result<()> {
        match self {
            Self::File(p) => ignore_missing(tokio::fs::remove_file(p).await),
            Self::Dir(p) => remove_dir(p).await,
        }
    }

    fn remove_blocking(&self) -> io::Result<()> {
        match self {
            Self::File(p) => ignore_missing(std::fs::remove_file(p)),
            Self::Dir(p) => remove_dir_blocking(p),
        }
    }
}

/// Scratch resources created by one attempt.
#[derive(Debug)]
pub struct AttemptScope {
    attempt: u32,
    resources: Vec<ScratchResource>,
}

impl AttemptScope {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            resources: Vec::new(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn register_file(&mut self, path: impl Into<PathBuf>) {
        self.resources.push(ScratchResource::File(path.into()));
    }

    pub fn register_dir(&mut self, path: impl Into<PathBuf>) {
        self.resources.push(ScratchResource::Dir(path.into()));
    }

    pub fn resources(&self) -> &[ScratchResource] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Remove one registered resource now and stop tracking it.
    pub async fn release_path(&mut self, path: &Path) {
        let Some(index) = self.resources.iter().position(|r| r.path() == path) else {
            return;
        };
        let resource = self.resources.remove(index);
        if let Err(e) = resource.remove().await {
            tracing::warn!(
                attempt = self.attempt,
                path = %path.display(),
                error = %e,
                "Failed to remove scratch resource",
            );
        }
    }

    /// Remove every registered resource, newest first. Each removal is
    /// independent; failures are logged and counted. Calling it again is a
    /// no-op.
    pub async fn release(&mut self) -> usize {
        let mut failures = 0;
        while let Some(resource) = self.resources.pop() {
            if let Err(e) = resource.remove().await {
                failures += 1;
                tracing::warn!(
                    attempt = self.attempt,
                    path = %resource.path().display(),
                    error = %e,
                    "Failed to remove scratch resource",
                );
            }
        }
        failures
    }
}

impl Drop for AttemptScope {
    fn drop(&mut self) {
        while let Some(resource) = self.resources.pop() {
            if let Err(e) = resource.remove_blocking() {
                tracing::warn!(
                    attempt = self.attempt,
                    path = %resource.path().display(),
                    error = %e,
                    "Failed to remove scratch resource on drop",
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Removal helpers
// ---------------------------------------------------------------------------

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir(path: &Path) -> io::Result<()> {
    ignore_missing(tokio::fs::remove_dir_all(path).await)
}

fn remove_dir_blocking(path: &Path) -> io::Result<()> {
    ignore_missing(std::fs::remove_dir_all(path))
}
