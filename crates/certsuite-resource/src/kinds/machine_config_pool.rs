//! MachineConfigPool CRD and pool convergence waits
//!
//! Only the fields needed to judge convergence are modelled; selectors are
//! kept as raw JSON so the pool can round-trip through the API unchanged.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use certsuite_common::Result;

use super::{
    has_condition, ConditionLike, CONDITION_DEGRADED, CONDITION_UPDATED, CONDITION_UPDATING,
};
use crate::api::{kind_of, ResourceApi};
use crate::group::{fetch_entities, EntitySet};
use crate::handle::ResourceHandle;
use crate::stability::{stay_stable, StabilityWindow};

/// Desired state of a MachineConfigPool
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    plural = "machineconfigpools",
    shortname = "mcp",
    status = "MachineConfigPoolStatus",
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyMachineCount"}"#,
    printcolumn = r#"{"name":"Machines","type":"integer","jsonPath":".status.machineCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Pause config rollout to the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    /// Selects the MachineConfigs applied to the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_config_selector: Option<serde_json::Value>,
    /// Selects the nodes in the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<serde_json::Value>,
}

/// Observed rollout state of a pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    /// Generation the controller last acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Machines in the pool
    #[serde(default)]
    pub machine_count: i32,
    /// Machines running the current config and ready
    #[serde(default)]
    pub ready_machine_count: i32,
    /// Machines running the current config
    #[serde(default)]
    pub updated_machine_count: i32,
    /// Machines that failed to apply the config
    #[serde(default)]
    pub degraded_machine_count: i32,
    /// Machines cordoned or otherwise unavailable
    #[serde(default)]
    pub unavailable_machine_count: i32,
    /// Pool conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<MachineConfigPoolCondition>>,
}

/// One pool condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolCondition {
    /// Condition type, e.g. "Updated"
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConditionLike for MachineConfigPoolCondition {
    fn condition_type(&self) -> &str {
        &self.type_
    }
    fn condition_status(&self) -> &str {
        &self.status
    }
}

/// Every machine is updated and ready, none degraded, no rollout in
/// progress, and the controller has observed the latest generation.
pub fn is_pool_stable(pool: &MachineConfigPool) -> bool {
    let Some(status) = pool.status.as_ref() else {
        return false;
    };
    let generation_seen = match (pool.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        _ => true,
    };
    let conditions = status.conditions.as_deref();

    generation_seen
        && status.ready_machine_count == status.machine_count
        && status.updated_machine_count == status.machine_count
        && status.degraded_machine_count == 0
        && !has_condition(conditions, CONDITION_DEGRADED)
        && !has_condition(conditions, CONDITION_UPDATING)
        && (conditions.is_none() || has_condition(conditions, CONDITION_UPDATED))
}

impl ResourceHandle<MachineConfigPool> {
    /// Wait for this pool to stay stable for a full window
    pub async fn wait_to_be_stable_for(&mut self, window: &StabilityWindow) -> Result<()> {
        let api = self.checked_api()?;
        let key = self.key();
        let what = format!("{} {}", kind_of::<MachineConfigPool>(), key);

        stay_stable(
            window,
            &what,
            || async { api.get(&key).await.map(|pool| vec![pool]) },
            is_pool_stable,
        )
        .await?;

        self.exists().await.map(|_| ())
    }
}

/// Wait for every pool in `pools` to stay stable for a full window
pub async fn wait_for_pools_stable(
    api: Arc<dyn ResourceApi<MachineConfigPool>>,
    pools: &EntitySet,
    window: &StabilityWindow,
    concurrency: usize,
) -> Result<()> {
    pools.validate()?;
    stay_stable(
        window,
        "machine config pools",
        || fetch_entities(api.as_ref(), pools, concurrency),
        is_pool_stable,
    )
    .await
}
