//! Resource engine for the certsuite QE harness
//!
//! Typed handles that reconcile a desired definition against the cluster,
//! bounded condition polling, and the two fleet algorithms built on it:
//! stability-window waiting and per-entity reboot-transition tracking.

#![deny(missing_docs)]

pub mod api;
pub mod client;
pub mod context;
pub mod group;
pub mod handle;
pub mod kinds;
pub mod poll;
pub mod stability;
pub mod transition;

#[cfg(test)]
mod testing;

pub use api::{KubeApi, ListSelector, ManagedObject, ObjectKey, ResourceApi};
pub use client::create_client;
pub use context::{Cleanup, TestContext};
pub use group::{fetch_entities, EntitySet};
pub use handle::ResourceHandle;
pub use kinds::machine_config_pool::{wait_for_pools_stable, MachineConfigPool};
pub use kinds::node::wait_for_nodes_reboot;
pub use poll::{poll_for, poll_until, PollSpec};
pub use stability::{stay_stable, StabilityWindow};
pub use transition::{wait_for_transition, EntityTransitionState, TransitionTracker};
