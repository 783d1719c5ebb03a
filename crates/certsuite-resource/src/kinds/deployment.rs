//! Deployment construction and readiness

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;

use certsuite_common::{Error, Result};

use crate::api::{ObjectKey, ResourceApi};
use crate::handle::ResourceHandle;
use crate::poll::PollSpec;

/// Label tying a deployment's selector to its pod template
pub const APP_LABEL_KEY: &str = "certsuite-qe/app";

/// Handle for a one-replica deployment whose selector matches its template
pub fn deployment(
    api: Arc<dyn ResourceApi<Deployment>>,
    name: &str,
    namespace: &str,
) -> ResourceHandle<Deployment> {
    let selector: BTreeMap<String, String> =
        [(APP_LABEL_KEY.to_string(), name.to_string())].into();
    let definition = Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec::default()),
            },
            ..Default::default()
        }),
        status: None,
    };
    ResourceHandle::new(api, definition)
}

/// Available replicas have caught up with the desired count
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    available == desired
}

fn spec_mut(def: &mut Deployment) -> &mut DeploymentSpec {
    def.spec.get_or_insert_with(DeploymentSpec::default)
}

impl ResourceHandle<Deployment> {
    /// Set the desired replica count
    pub fn with_replicas(self, replicas: i32) -> Self {
        self.with_definition(|def| {
            if replicas < 0 {
                return Err(Error::validation_for_field(
                    ObjectKey::of(def).to_string(),
                    "spec.replicas",
                    format!("replicas must be non-negative, got {}", replicas),
                ));
            }
            spec_mut(def).replicas = Some(replicas);
            Ok(())
        })
    }

    /// Append a container to the pod template
    pub fn with_container(self, name: impl Into<String>, image: impl Into<String>) -> Self {
        let (name, image) = (name.into(), image.into());
        self.with_definition(|def| {
            let resource = ObjectKey::of(def).to_string();
            if name.is_empty() {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.template.spec.containers.name",
                    "container name cannot be empty",
                ));
            }
            if image.is_empty() {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.template.spec.containers.image",
                    format!("container {} has no image", name),
                ));
            }
            let pod = spec_mut(def).template.spec.get_or_insert_with(PodSpec::default);
            if pod.containers.iter().any(|c| c.name == name) {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.template.spec.containers.name",
                    format!("duplicate container name {}", name),
                ));
            }
            pod.containers.push(Container {
                name,
                image: Some(image),
                ..Default::default()
            });
            Ok(())
        })
    }

    /// Wait until every desired replica is available
    pub async fn wait_until_ready(&mut self, spec: &PollSpec) -> Result<()> {
        self.wait_until(spec, "to be ready", is_deployment_ready).await
    }
}
