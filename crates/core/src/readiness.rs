//! File readiness detection.
//!
//! Renderers and muxers write their output from child processes, and
//! completion is not otherwise observable. [`wait_for_stable_file`] polls
//! the file size until it is non-zero and unchanged across consecutive
//! checks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::poll::{poll_until, PollConfig, PollError, PollStep, Probe};

/// Tuning for [`wait_for_stable_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Number of consecutive checks that must observe the same size.
    pub required_stable_checks: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            required_stable_checks: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("file {path} did not become stable: {source}")]
    NotStable {
        path: String,
        #[source]
        source: PollError,
    },
}

/// Tracks the size of one file across checks.
struct FileStabilityProbe {
    path: PathBuf,
    last_size: Option<u64>,
    stable_checks: u32,
    required: u32,
}

impl Probe for FileStabilityProbe {
    type Output = u64;

    async fn check(&mut self) -> PollStep<u64> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                self.last_size = None;
                self.stable_checks = 0;
                return PollStep::Pending;
            }
        };

        if size > 0 && self.last_size == Some(size) {
            self.stable_checks += 1;
        } else {
            self.stable_checks = 0;
        }
        self.last_size = Some(size);

        if self.stable_checks >= self.required {
            PollStep::Ready(size)
        } else {
            PollStep::Pending
        }
    }
}

/// Wait until `path` exists with a non-zero size that stays unchanged for
/// `required_stable_checks` consecutive polls. Returns the final size.
pub async fn wait_for_stable_file(
    path: &Path,
    config: StabilityConfig,
    cancel: &CancellationToken,
) -> Result<u64, ReadinessError> {
    let mut probe = FileStabilityProbe {
        path: path.to_path_buf(),
        last_size: None,
        stable_checks: 0,
        required: config.required_stable_checks.max(1),
    };

    poll_until(
        &mut probe,
        PollConfig::new(config.interval, config.timeout),
        cancel,
    )
    .await
    .map_err(|source| ReadinessError::NotStable {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn fast() -> StabilityConfig {
        StabilityConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
            required_stable_checks: 2,
        }
    }

    #[tokio::test]
    async fn stable_file_reports_its_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.mp4");
        tokio::fs::write(&path, vec![0u8; 4096]).await.expect("write");

        let size = wait_for_stable_file(&path, fast(), &CancellationToken::new())
            .await
            .expect("stable");
        assert_eq!(size, 4096);
    }

    #[tokio::test]
    async fn empty_file_never_becomes_ready() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("empty.mp4");
        tokio::fs::write(&path, b"").await.expect("write");

        let result = wait_for_stable_file(&path, fast(), &CancellationToken::new()).await;
        assert_matches!(
            result,
            Err(ReadinessError::NotStable { source: PollError::TimedOut { .. }, .. })
        );
    }

    #[tokio::test]
    async fn missing_file_times_out() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("never-written.mp4");

        let result = wait_for_stable_file(&path, fast(), &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn growing_file_is_waited_on_until_it_settles() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("growing.mp4");
        tokio::fs::write(&path, vec![1u8; 100]).await.expect("write");

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(15)).await;
                let mut data = tokio::fs::read(&writer_path).await.expect("read");
                data.extend_from_slice(&[1u8; 100]);
                tokio::fs::write(&writer_path, data).await.expect("append");
            }
        });

        let config = StabilityConfig {
            interval: Duration::from_millis(40),
            timeout: Duration::from_secs(2),
            required_stable_checks: 2,
        };
        let size = wait_for_stable_file(&path, config, &CancellationToken::new())
            .await
            .expect("stable");
        writer.await.expect("writer");
        assert_eq!(size, 400);
    }
}
