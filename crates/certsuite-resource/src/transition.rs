//! Per-entity healthy → unhealthy → healthy tracking
//!
//! Used for rolling-reboot detection: an entity only counts once it has been
//! observed going down and coming back. An entity that stays healthy the
//! whole time is never reported as rebooted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use certsuite_common::{Error, Result, SuiteConfig};

use crate::api::{kind_of, ManagedObject, ObjectKey, ResourceApi};
use crate::group::fetch_each;
use crate::poll::{poll_until, PollSpec};

/// Where an entity is in its transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityTransitionState {
    /// Not yet observed unhealthy
    Initial,
    /// Observed unhealthy, waiting for it to come back
    Degraded,
    /// Observed healthy again after being degraded; terminal
    Recovered,
}

impl EntityTransitionState {
    /// Next state after one health observation
    pub fn observe(self, healthy: bool) -> Self {
        match (self, healthy) {
            (Self::Recovered, _) => Self::Recovered,
            (Self::Degraded, true) => Self::Recovered,
            (_, false) => Self::Degraded,
            (Self::Initial, true) => Self::Initial,
        }
    }
}

/// Tracks a set of entities against one global deadline
pub struct TransitionTracker<K: ManagedObject, H> {
    api: Arc<dyn ResourceApi<K>>,
    states: Mutex<BTreeMap<ObjectKey, EntityTransitionState>>,
    healthy: H,
    interval: Duration,
    global_timeout: Duration,
    concurrency: usize,
    cancel: Option<CancellationToken>,
}

impl<K, H> TransitionTracker<K, H>
where
    K: ManagedObject,
    H: Fn(&K) -> bool,
{
    /// Track `entities`, all starting in [`EntityTransitionState::Initial`]
    pub fn new<I>(api: Arc<dyn ResourceApi<K>>, entities: I, healthy: H) -> Self
    where
        I: IntoIterator<Item = ObjectKey>,
    {
        let config = SuiteConfig::default();
        Self {
            api,
            states: Mutex::new(
                entities
                    .into_iter()
                    .map(|key| (key, EntityTransitionState::Initial))
                    .collect(),
            ),
            healthy,
            interval: config.transition_poll_interval(),
            global_timeout: config.default_timeout(),
            concurrency: config.fetch_concurrency,
            cancel: None,
        }
    }

    /// Take interval and concurrency from configuration
    pub fn with_config(mut self, config: &SuiteConfig) -> Self {
        self.interval = config.transition_poll_interval();
        self.concurrency = config.fetch_concurrency;
        self
    }

    /// Time between ticks
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Deadline for every entity to recover
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    /// Maximum concurrent fetches per tick
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Snapshot of every entity's state
    pub fn states(&self) -> BTreeMap<ObjectKey, EntityTransitionState> {
        self.states.lock().clone()
    }

    /// Entities that have not recovered yet
    pub fn pending(&self) -> Vec<ObjectKey> {
        self.states
            .lock()
            .iter()
            .filter(|(_, state)| **state != EntityTransitionState::Recovered)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Observe every non-recovered entity once; true when all recovered.
    ///
    /// "Not found" counts as unhealthy. Retryable fetch errors leave that
    /// entity's state unchanged for this tick.
    pub async fn tick(&self) -> Result<bool> {
        let pending = self.pending();
        let observations = fetch_each(self.api.as_ref(), &pending, self.concurrency).await;

        let mut states = self.states.lock();
        for (key, result) in observations {
            let healthy = match result {
                Ok(object) => (self.healthy)(&object),
                Err(e) if e.is_not_found() => false,
                Err(e) if e.is_retryable() => {
                    debug!(kind = %kind_of::<K>(), entity = %key, error = %e, "Health fetch failed, skipping this tick");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(state) = states.get_mut(&key) {
                let next = state.observe(healthy);
                if next != *state {
                    info!(kind = %kind_of::<K>(), entity = %key, from = ?*state, to = ?next, "Entity transition observed");
                }
                *state = next;
            }
        }

        Ok(states
            .values()
            .all(|state| *state == EntityTransitionState::Recovered))
    }

    /// Poll until every entity recovers.
    ///
    /// The timeout error names the entities still pending.
    pub async fn run(&self) -> Result<()> {
        if self.states.lock().is_empty() {
            return Err(Error::validation("transition tracker has no entities"));
        }

        let what = format!("{} transitions", kind_of::<K>());
        let mut spec = PollSpec::new(self.interval, self.global_timeout);
        if let Some(token) = &self.cancel {
            spec = spec.with_cancellation(token.clone());
        }

        let result = poll_until(&spec, &what, || self.tick()).await;
        match result {
            Err(Error::Timeout { .. }) => {
                let pending: Vec<String> = self
                    .states()
                    .into_iter()
                    .filter(|(_, state)| *state != EntityTransitionState::Recovered)
                    .map(|(key, state)| format!("{} ({:?})", key, state))
                    .collect();
                Err(Error::timeout(
                    what,
                    self.global_timeout,
                    format!("not recovered: {}", pending.join(", ")),
                ))
            }
            other => other,
        }
    }
}

/// True iff every entity went healthy → unhealthy → healthy before the
/// tracker's deadline. A deadline miss is logged and reported as `false`;
/// other failures are returned as errors.
pub async fn wait_for_transition<K, H>(tracker: &TransitionTracker<K, H>) -> Result<bool>
where
    K: ManagedObject,
    H: Fn(&K) -> bool,
{
    match tracker.run().await {
        Ok(()) => Ok(true),
        Err(e) if e.is_timeout() => {
            warn!(error = %e, "Entities did not complete their transition");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
