//! Bounded-interval condition polling
//!
//! Every "wait until ready / until condition / until deleted" operation is an
//! instance of [`poll_for`]: evaluate an async check at a fixed interval until
//! it yields a value, fails terminally, the deadline elapses, or the caller
//! cancels through the [`PollSpec`]'s [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use certsuite_common::{Error, Result, SuiteConfig};

/// Message used when the deadline elapses without any recorded failure
const CONDITION_NOT_MET: &str = "condition not met";

/// Timing and cancellation for one wait
#[derive(Clone, Debug)]
pub struct PollSpec {
    /// Time between checks
    pub interval: Duration,
    /// Total budget; checked before every evaluation
    pub timeout: Duration,
    /// Run the first check before the first sleep
    pub immediate: bool,
    /// Cooperative cancellation of the wait
    pub cancel: Option<CancellationToken>,
}

impl PollSpec {
    /// Poll every `interval` for at most `timeout`, checking immediately
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: true,
            cancel: None,
        }
    }

    /// Spec using the configured interval and default timeout
    pub fn from_config(config: &SuiteConfig) -> Self {
        Self::new(config.poll_interval(), config.default_timeout())
    }

    /// Set whether the first check runs before the first sleep
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Replace the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Resolves when `token` is cancelled; never resolves without a token.
pub(crate) async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Sleep for `duration` unless the wait is cancelled first.
pub(crate) async fn sleep_or_cancel(
    duration: Duration,
    token: Option<&CancellationToken>,
    what: &str,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancelled(token) => Err(Error::cancelled(what)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Poll until `check` yields a value.
///
/// `check` returns `Ok(Some(value))` when the condition holds, `Ok(None)` to
/// keep polling, or `Err`. Retryable errors are logged and polled through;
/// anything else aborts the wait. Each evaluation is bounded by the remaining
/// budget so a hung request cannot overrun the deadline.
pub async fn poll_for<T, F, Fut>(spec: &PollSpec, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let token = spec.cancel.as_ref();
    let mut last_error: Option<String> = None;
    let mut attempts = 0u32;

    if !spec.immediate {
        sleep_or_cancel(spec.interval.min(spec.timeout), token, what).await?;
    }

    loop {
        let elapsed = start.elapsed();
        if elapsed >= spec.timeout {
            debug!(what = %what, attempts, "Poll deadline elapsed");
            return Err(Error::timeout(
                what,
                spec.timeout,
                last_error.unwrap_or_else(|| CONDITION_NOT_MET.to_string()),
            ));
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancelled(token) => return Err(Error::cancelled(what)),
            outcome = tokio::time::timeout(spec.timeout - elapsed, check()) => outcome,
        };

        match outcome {
            Ok(Ok(Some(value))) => {
                debug!(what = %what, attempts, elapsed_ms = start.elapsed().as_millis(), "Condition met");
                return Ok(value);
            }
            Ok(Ok(None)) => {
                trace!(what = %what, attempts, "Condition not yet met, retrying");
                last_error = None;
            }
            Ok(Err(e)) if e.is_retryable() => {
                trace!(what = %what, attempts, error = %e, "Poll check failed (retrying)");
                last_error = Some(e.to_string());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                last_error = Some("check did not complete before the deadline".to_string());
                continue;
            }
        }

        let remaining = spec.timeout.saturating_sub(start.elapsed());
        sleep_or_cancel(spec.interval.min(remaining), token, what).await?;
    }
}

/// Poll until `check` returns `Ok(true)`.
pub async fn poll_until<F, Fut>(spec: &PollSpec, what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_for(spec, what, || {
        let fut = check();
        async move { Ok(fut.await?.then_some(())) }
    })
    .await
}
