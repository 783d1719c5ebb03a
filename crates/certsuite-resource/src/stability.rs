//! Stability-window waiting over a fleet
//!
//! A single "ready" read does not prove convergence when fleet state can
//! flap. [`stay_stable`] requires one contiguous window of `stable_duration`
//! in which every sample finds every entity healthy. The first unhealthy
//! sample abandons the window; a fresh window starts at the next sample tick.
//! Only `overall_timeout` bounds the total time spent across attempts.

use std::future::Future;
use std::time::Duration;

use kube::ResourceExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use certsuite_common::{Result, SuiteConfig};

use crate::poll::{poll_until, PollSpec};

/// Timing of a stability wait
#[derive(Clone, Debug)]
pub struct StabilityWindow {
    /// How long health must hold continuously
    pub stable_duration: Duration,
    /// Budget across all attempts
    pub overall_timeout: Duration,
    /// Time between samples within a window
    pub sample_interval: Duration,
    /// Cooperative cancellation
    pub cancel: Option<CancellationToken>,
}

impl StabilityWindow {
    /// Window sampled at the configured stability interval
    pub fn new(stable_duration: Duration, overall_timeout: Duration, config: &SuiteConfig) -> Self {
        Self {
            stable_duration,
            overall_timeout,
            sample_interval: config.stability_sample_interval(),
            cancel: None,
        }
    }

    /// Replace the sample interval
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn outer_spec(&self) -> PollSpec {
        let spec = PollSpec::new(self.sample_interval, self.overall_timeout);
        match &self.cancel {
            Some(token) => spec.with_cancellation(token.clone()),
            None => spec,
        }
    }
}

/// Wait until every entity returned by `fetch_group` stays `healthy` for a
/// full window.
///
/// Fetch errors that are retryable abandon the current window and are
/// retried; others abort the wait. An empty sample counts as unhealthy.
pub async fn stay_stable<K, F, Fut, H>(
    window: &StabilityWindow,
    what: &str,
    fetch_group: F,
    healthy: H,
) -> Result<()>
where
    K: ResourceExt,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<K>>>,
    H: Fn(&K) -> bool,
{
    let mut attempt = 0u32;
    let label = format!("{} to stay stable for {:?}", what, window.stable_duration);

    poll_until(&window.outer_spec(), &label, || {
        attempt += 1;
        sample_window(window, what, attempt, &fetch_group, &healthy)
    })
    .await?;

    info!(what = %what, attempts = attempt, stable_for = ?window.stable_duration, "Group is stable");
    Ok(())
}

/// One attempt: sample until the window elapses or a sample is unhealthy.
async fn sample_window<K, F, Fut, H>(
    window: &StabilityWindow,
    what: &str,
    attempt: u32,
    fetch_group: &F,
    healthy: &H,
) -> Result<bool>
where
    K: ResourceExt,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<K>>>,
    H: Fn(&K) -> bool,
{
    let start = Instant::now();
    let mut samples = 0u32;

    loop {
        let group = fetch_group().await?;
        samples += 1;

        if group.is_empty() {
            debug!(what = %what, attempt, sample = samples, "Group is empty, restarting window");
            return Ok(false);
        }
        if let Some(entity) = group.iter().find(|e| !healthy(e)) {
            debug!(
                what = %what,
                attempt,
                sample = samples,
                entity = %entity.name_any(),
                "Unhealthy sample, restarting window"
            );
            return Ok(false);
        }

        let elapsed = start.elapsed();
        if elapsed >= window.stable_duration {
            debug!(what = %what, attempt, samples, "Window completed with every sample healthy");
            return Ok(true);
        }
        tokio::time::sleep(window.sample_interval.min(window.stable_duration - elapsed)).await;
    }
}
