//! Per-test state: namespace, shared labels, and created resources
//!
//! Everything a test creates is tracked here and torn down in reverse order,
//! so dependents go before the things they depend on.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};

use certsuite_common::{Result, MANAGED_BY_LABEL_KEY};

use crate::api::{kind_of, ManagedObject};
use crate::handle::ResourceHandle;

/// Value of the managed-by label on everything a context labels
pub const MANAGED_BY: &str = "certsuite-qe";

/// Something a test context can tear down
#[async_trait]
pub trait Cleanup: Send {
    /// Human-readable identity for logs
    fn describe(&self) -> String;

    /// Remove the resource; absence is success
    async fn cleanup(&mut self) -> Result<()>;
}

#[async_trait]
impl<K: ManagedObject> Cleanup for ResourceHandle<K> {
    fn describe(&self) -> String {
        format!("{} {}", kind_of::<K>(), self.key())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.delete().await
    }
}

/// State owned by a single test
pub struct TestContext {
    namespace: String,
    labels: BTreeMap<String, String>,
    tracked: Vec<Box<dyn Cleanup>>,
}

impl TestContext {
    /// Context for a test running in `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            labels: [(MANAGED_BY_LABEL_KEY.to_string(), MANAGED_BY.to_string())].into(),
            tracked: Vec::new(),
        }
    }

    /// Add a label applied by [`labelled`](Self::labelled)
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// The test namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Labels shared by every resource the test creates
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Apply the shared labels to a handle
    pub fn labelled<K: ManagedObject>(&self, handle: ResourceHandle<K>) -> ResourceHandle<K> {
        handle.with_labels(&self.labels)
    }

    /// Register a resource for cleanup
    pub fn track<C: Cleanup + 'static>(&mut self, resource: C) {
        self.tracked.push(Box::new(resource));
    }

    /// Number of resources awaiting cleanup
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    /// Tear down every tracked resource, newest first.
    ///
    /// Every resource is attempted; the first failure is returned.
    pub async fn cleanup(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(mut resource) = self.tracked.pop() {
            let what = resource.describe();
            match resource.cleanup().await {
                Ok(()) => info!(namespace = %self.namespace, resource = %what, "Cleaned up"),
                Err(e) => {
                    warn!(namespace = %self.namespace, resource = %what, error = %e, "Cleanup failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
