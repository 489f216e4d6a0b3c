//! Bounded, cancellable polling.
//!
//! [`poll_until`] repeatedly asks a [`Probe`] for its current state at a
//! fixed interval until the probe reports a terminal step, the wait budget
//! is spent, or the [`CancellationToken`] fires. Both the upload-state poll
//! and the file-stability waiter are built on it.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Interval and overall budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between consecutive checks.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Result of a single probe check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// The awaited condition holds; stop polling with this value.
    Ready(T),
    /// Not there yet; check again after the interval.
    Pending,
    /// The condition can never hold; stop polling with this reason.
    Failed(String),
}

/// Why a polling loop stopped without a value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    #[error("gave up after {checks} checks ({elapsed_ms}ms)")]
    TimedOut { checks: u32, elapsed_ms: u64 },

    #[error("{0}")]
    Failed(String),

    #[error("polling cancelled")]
    Cancelled,
}

/// A stateful condition checked by [`poll_until`].
///
/// `&mut self` lets implementations carry state between checks (for
/// example the previously observed file size).
pub trait Probe: Send {
    type Output: Send;

    fn check(&mut self) -> impl Future<Output = PollStep<Self::Output>> + Send;
}

/// Poll `probe` until it reports [`PollStep::Ready`] or [`PollStep::Failed`],
/// the budget in `config` is exhausted, or `cancel` is triggered.
///
/// The first check happens immediately. A check is never started after the
/// deadline has passed, but a check that is already running is not
/// interrupted by the deadline.
pub async fn poll_until<P: Probe>(
    probe: &mut P,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Result<P::Output, PollError> {
    let start = Instant::now();
    let mut checks = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        checks += 1;
        match probe.check().await {
            PollStep::Ready(value) => return Ok(value),
            PollStep::Failed(reason) => return Err(PollError::Failed(reason)),
            PollStep::Pending => {}
        }

        let elapsed = start.elapsed();
        if elapsed + config.interval > config.timeout {
            return Err(PollError::TimedOut {
                checks,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}
