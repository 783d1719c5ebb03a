//! Node health and reboot detection

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;
use tokio_util::sync::CancellationToken;

use certsuite_common::{Result, SuiteConfig};

use super::{has_condition, CONDITION_READY};
use crate::api::{ObjectKey, ResourceApi};
use crate::handle::ResourceHandle;
use crate::poll::PollSpec;
use crate::transition::{wait_for_transition, TransitionTracker};

/// True when the node reports `Ready=True`
pub fn is_node_ready(node: &Node) -> bool {
    let conditions = node.status.as_ref().and_then(|s| s.conditions.as_deref());
    has_condition(conditions, CONDITION_READY)
}

impl ResourceHandle<Node> {
    /// Wait for the node to report Ready
    pub async fn wait_until_ready(&mut self, spec: &PollSpec) -> Result<()> {
        self.wait_until(spec, "to be ready", is_node_ready).await
    }
}

/// True iff every named node went NotReady and came back Ready within
/// `timeout`. Nodes that never went down do not count as rebooted.
pub async fn wait_for_nodes_reboot(
    api: Arc<dyn ResourceApi<Node>>,
    nodes: &[String],
    timeout: Duration,
    config: &SuiteConfig,
    cancel: Option<CancellationToken>,
) -> Result<bool> {
    let mut tracker = TransitionTracker::new(
        api,
        nodes.iter().map(ObjectKey::cluster),
        is_node_ready,
    )
    .with_config(config)
    .with_global_timeout(timeout);
    if let Some(token) = cancel {
        tracker = tracker.with_cancellation(token);
    }
    wait_for_transition(&tracker).await
}
