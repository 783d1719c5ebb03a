//! Typed constructors and health predicates for the kinds the suite drives

pub mod deployment;
pub mod machine_config_pool;
pub mod namespace;
pub mod node;

/// Condition type for node readiness
pub const CONDITION_READY: &str = "Ready";
/// Condition type set while a pool rolls out a new config
pub const CONDITION_UPDATING: &str = "Updating";
/// Condition type set when a pool has finished rolling out
pub const CONDITION_UPDATED: &str = "Updated";
/// Condition type set when a pool cannot make progress
pub const CONDITION_DEGRADED: &str = "Degraded";

const STATUS_TRUE: &str = "True";

/// True when `conditions` holds a `condition_type` entry whose status is "True"
pub fn has_condition<C: ConditionLike>(conditions: Option<&[C]>, condition_type: &str) -> bool {
    conditions
        .unwrap_or_default()
        .iter()
        .any(|c| c.condition_type() == condition_type && c.condition_status() == STATUS_TRUE)
}

/// Status condition entries of node and pool status blocks
pub trait ConditionLike {
    /// The `type` field
    fn condition_type(&self) -> &str;
    /// The `status` field: "True", "False" or "Unknown"
    fn condition_status(&self) -> &str;
}

impl ConditionLike for k8s_openapi::api::core::v1::NodeCondition {
    fn condition_type(&self) -> &str {
        &self.type_
    }
    fn condition_status(&self) -> &str {
        &self.status
    }
}
