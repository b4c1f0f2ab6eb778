//! Bounded, cancellable fixed-interval polling.
//!
//! Every wait in the driver (scalet activation, SSH readiness, provider task
//! completion) goes through [`poll_until`]. The probe runs immediately and
//! then once per interval until it reports readiness, returns an error, the
//! timeout elapses, or the cancellation token fires. Probe errors are never
//! retried.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval and overall budget for a polling loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Delay between consecutive probes.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Builds a policy from an interval and a timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Outcome of a single probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Poll<T> {
    /// The awaited condition holds; carries the value to return.
    Ready(T),
    /// Not there yet; probe again after the interval.
    Pending,
}

/// Reasons a polling loop stopped without a ready value.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WaitError<E> {
    /// The probe itself failed.
    #[error("{0}")]
    Probe(E),
    /// The timeout elapsed before the condition held.
    #[error("timed out after {elapsed:?} waiting for {action}")]
    Timeout {
        /// Description of what was being waited for.
        action: String,
        /// Time spent before giving up.
        elapsed: Duration,
    },
    /// The cancellation token fired.
    #[error("cancelled while waiting for {action}")]
    Cancelled {
        /// Description of what was being waited for.
        action: String,
    },
}

/// Polls `probe` according to `policy` until it reports readiness.
///
/// # Errors
///
/// Returns [`WaitError::Probe`] as soon as the probe fails,
/// [`WaitError::Timeout`] once the policy's timeout has elapsed, and
/// [`WaitError::Cancelled`] when `cancel` fires.
pub async fn poll_until<T, E, F, Fut>(
    action: &str,
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled {
                action: action.to_owned(),
            });
        }

        attempt = attempt.saturating_add(1);
        debug!(action, attempt, "polling");
        if let Poll::Ready(value) = probe().await.map_err(WaitError::Probe)? {
            return Ok(value);
        }

        if Instant::now() + policy.interval > deadline {
            return Err(WaitError::Timeout {
                action: action.to_owned(),
                elapsed: started.elapsed(),
            });
        }

        tokio::select! {
            () = cancel.cancelled() => {
                return Err(WaitError::Cancelled {
                    action: action.to_owned(),
                });
            }
            () = sleep(policy.interval) => {}
        }
    }
}
