//! Namespaces

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;

use certsuite_common::Result;

use crate::api::ResourceApi;
use crate::handle::ResourceHandle;
use crate::poll::PollSpec;

/// Handle for a namespace named `name`
pub fn namespace(api: Arc<dyn ResourceApi<Namespace>>, name: &str) -> ResourceHandle<Namespace> {
    ResourceHandle::new(
        api,
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

/// Phase is "Active"; a terminating namespace is not
pub fn is_namespace_active(ns: &Namespace) -> bool {
    ns.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Active")
}

impl ResourceHandle<Namespace> {
    /// Wait for the namespace to become active
    pub async fn wait_until_active(&mut self, spec: &PollSpec) -> Result<()> {
        self.wait_until(spec, "to be active", is_namespace_active).await
    }
}
