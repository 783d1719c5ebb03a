//! Generic resource handle: validation gate, existence sync and mutators
//!
//! A [`ResourceHandle`] pairs a desired-state definition with the last state
//! observed on the server. Configuration calls consume and return the handle,
//! recording the first failure; every remote operation passes the validation
//! gate first and never touches the server for an invalid handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use certsuite_common::{Error, ExistencePolicy, Result};

use crate::api::{kind_of, ManagedObject, ObjectKey, ResourceApi};
use crate::poll::{poll_for, PollSpec};

/// Typed desired/observed state for one remote object
pub struct ResourceHandle<K: ManagedObject> {
    definition: K,
    object: Option<K>,
    api: Option<Arc<dyn ResourceApi<K>>>,
    deferred_error: Option<String>,
    existence_policy: ExistencePolicy,
}

impl<K: ManagedObject> std::fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &kind_of::<K>())
            .field("key", &self.key())
            .field("observed", &self.object.is_some())
            .field("has_client", &self.api.is_some())
            .field("deferred_error", &self.deferred_error)
            .finish()
    }
}

impl<K: ManagedObject> ResourceHandle<K> {
    /// Handle for `definition`, talking to the server through `api`
    pub fn new(api: Arc<dyn ResourceApi<K>>, definition: K) -> Self {
        Self {
            definition,
            object: None,
            api: Some(api),
            deferred_error: None,
            existence_policy: ExistencePolicy::default(),
        }
    }

    /// Handle with no client; usable for configuration only until
    /// [`with_api`](Self::with_api) attaches one.
    pub fn offline(definition: K) -> Self {
        Self {
            definition,
            object: None,
            api: None,
            deferred_error: None,
            existence_policy: ExistencePolicy::default(),
        }
    }

    /// Handle for an object that already exists on the server.
    ///
    /// The fetched object becomes both the definition and the observed state.
    pub async fn pull(api: Arc<dyn ResourceApi<K>>, key: ObjectKey) -> Result<Self> {
        check_identity::<K>(&key)?;
        let object = api.get(&key).await?;
        debug!(kind = %kind_of::<K>(), key = %key, "Pulled existing object");
        Ok(Self {
            definition: object.clone(),
            object: Some(object),
            api: Some(api),
            deferred_error: None,
            existence_policy: ExistencePolicy::default(),
        })
    }

    /// Attach a client
    pub fn with_api(mut self, api: Arc<dyn ResourceApi<K>>) -> Self {
        self.api = Some(api);
        self
    }

    /// Choose how `exists()` treats non-404 server errors
    pub fn with_existence_policy(mut self, policy: ExistencePolicy) -> Self {
        self.existence_policy = policy;
        self
    }

    /// Apply an edit to the definition.
    ///
    /// The edit runs on a copy and is committed only if it succeeds; a
    /// failure is recorded as the handle's deferred error. Once an error is
    /// recorded further edits are skipped.
    pub fn with_definition<F>(mut self, edit: F) -> Self
    where
        F: FnOnce(&mut K) -> Result<()>,
    {
        if self.deferred_error.is_some() {
            return self;
        }
        let mut next = self.definition.clone();
        match edit(&mut next) {
            Ok(()) => self.definition = next,
            Err(e) => {
                debug!(kind = %kind_of::<K>(), key = %self.key(), error = %e, "Recording configuration error");
                self.deferred_error = Some(e.to_string());
            }
        }
        self
    }

    /// Set a metadata label on the definition
    pub fn with_label(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.with_definition(|def| {
            if key.is_empty() {
                return Err(Error::validation_for_field(
                    ObjectKey::of(def).to_string(),
                    "metadata.labels",
                    "label key cannot be empty",
                ));
            }
            def.meta_mut()
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(key, value);
            Ok(())
        })
    }

    /// Set several labels at once
    pub fn with_labels(self, labels: &BTreeMap<String, String>) -> Self {
        labels
            .iter()
            .fold(self, |handle, (k, v)| handle.with_label(k.clone(), v.clone()))
    }

    /// Set a metadata annotation on the definition
    pub fn with_annotation(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.with_definition(|def| {
            if key.is_empty() {
                return Err(Error::validation_for_field(
                    ObjectKey::of(def).to_string(),
                    "metadata.annotations",
                    "annotation key cannot be empty",
                ));
            }
            def.meta_mut()
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(key, value);
            Ok(())
        })
    }

    /// End a configuration chain, surfacing the first recorded error
    pub fn build(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Identity of the object
    pub fn key(&self) -> ObjectKey {
        ObjectKey::of(&self.definition)
    }

    /// Desired state
    pub fn definition(&self) -> &K {
        &self.definition
    }

    /// Last state read from the server
    pub fn object(&self) -> Option<&K> {
        self.object.as_ref()
    }

    /// First configuration error, if any
    pub fn deferred_error(&self) -> Option<&str> {
        self.deferred_error.as_deref()
    }

    /// Validation gate.
    ///
    /// Fails when a configuration error was recorded, no client is attached,
    /// or the identity is incomplete.
    pub fn validate(&self) -> Result<()> {
        self.checked_api().map(|_| ())
    }

    pub(crate) fn checked_api(&self) -> Result<Arc<dyn ResourceApi<K>>> {
        let key = self.key();
        if let Some(err) = &self.deferred_error {
            return Err(Error::validation_for(
                format!("{} {}", kind_of::<K>(), key),
                err.clone(),
            ));
        }
        check_identity::<K>(&key)?;
        self.api.clone().ok_or_else(|| {
            Error::validation_for(format!("{} {}", kind_of::<K>(), key), "client is not set")
        })
    }

    /// Fetch the current state without touching the observed object
    pub async fn get(&self) -> Result<K> {
        let api = self.checked_api()?;
        api.get(&self.key()).await
    }

    /// Refresh the observed object and report whether it exists.
    ///
    /// "Not found" clears the observed object and returns false. Other server
    /// errors are surfaced under [`ExistencePolicy::Strict`] and reported as
    /// present under [`ExistencePolicy::Legacy`].
    pub async fn exists(&mut self) -> Result<bool> {
        let api = self.checked_api()?;
        let key = self.key();

        match api.get(&key).await {
            Ok(object) => {
                self.object = Some(object);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                self.object = None;
                Ok(false)
            }
            Err(e) => match self.existence_policy {
                ExistencePolicy::Strict => Err(e),
                ExistencePolicy::Legacy => {
                    warn!(kind = %kind_of::<K>(), key = %key, error = %e, "Existence check failed; assuming object exists");
                    self.object = None;
                    Ok(true)
                }
            },
        }
    }

    /// Create the object unless it already exists
    pub async fn create(&mut self) -> Result<()> {
        let api = self.checked_api()?;
        if self.exists().await? {
            debug!(kind = %kind_of::<K>(), key = %self.key(), "Object already exists, skipping create");
            return Ok(());
        }

        let created = api.create(&self.definition).await?;
        info!(kind = %kind_of::<K>(), key = %self.key(), "Created object");
        self.object = Some(created);
        Ok(())
    }

    /// Replace the remote object with the definition.
    ///
    /// Fails with [`Error::NotFound`] when the object does not exist.
    pub async fn update(&mut self) -> Result<()> {
        let api = self.checked_api()?;
        let key = self.key();
        if !self.exists().await? {
            return Err(Error::not_found(kind_of::<K>(), key.to_string()));
        }

        let updated = api.update(&self.definition).await?;
        info!(kind = %kind_of::<K>(), key = %key, "Updated object");
        self.object = Some(updated);
        Ok(())
    }

    /// Delete the object; absence counts as success.
    pub async fn delete(&mut self) -> Result<()> {
        let api = self.checked_api()?;
        let key = self.key();
        if !self.exists().await? {
            debug!(kind = %kind_of::<K>(), key = %key, "Object absent, nothing to delete");
            self.object = None;
            return Ok(());
        }

        // Once a Delete has been issued the last observation is stale.
        let result = api.delete(&key).await;
        self.object = None;
        match result {
            Ok(()) => {
                info!(kind = %kind_of::<K>(), key = %key, "Deleted object");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind_of::<K>(), key = %key, "Object vanished before delete");
                Ok(())
            }
            Err(e) => {
                warn!(kind = %kind_of::<K>(), key = %key, error = %e, "Delete failed");
                Err(e)
            }
        }
    }

    /// Poll until `predicate` holds for the fetched object.
    ///
    /// A missing object keeps the wait going. The matching object becomes the
    /// observed state.
    pub async fn wait_until<P>(&mut self, spec: &PollSpec, what: &str, predicate: P) -> Result<()>
    where
        P: Fn(&K) -> bool,
    {
        let api = self.checked_api()?;
        let key = self.key();
        let label = format!("{} {} {}", kind_of::<K>(), key, what);

        let object = poll_for(spec, &label, || async {
            match api.get(&key).await {
                Ok(current) => Ok(predicate(&current).then_some(current)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?;

        self.object = Some(object);
        Ok(())
    }

    /// Poll until the object can be fetched
    pub async fn wait_until_exists(&mut self, spec: &PollSpec) -> Result<()> {
        self.wait_until(spec, "to exist", |_| true).await
    }

    /// Poll until the server reports the object as not found
    pub async fn wait_until_deleted(&mut self, spec: &PollSpec) -> Result<()> {
        let api = self.checked_api()?;
        let key = self.key();
        let label = format!("{} {} to be deleted", kind_of::<K>(), key);

        poll_for(spec, &label, || async {
            match api.get(&key).await {
                Ok(_) => Ok(None),
                Err(e) if e.is_not_found() => Ok(Some(())),
                Err(e) => Err(e),
            }
        })
        .await?;

        self.object = None;
        Ok(())
    }
}

/// A usable identity has a name, and a namespace that is either absent or
/// non-empty.
fn check_identity<K: ManagedObject>(key: &ObjectKey) -> Result<()> {
    let resource = format!("{} {}", kind_of::<K>(), key);
    if key.name.is_empty() {
        return Err(Error::validation_for_field(
            resource,
            "metadata.name",
            "name cannot be empty",
        ));
    }
    if matches!(key.namespace.as_deref(), Some("")) {
        return Err(Error::validation_for_field(
            resource,
            "metadata.namespace",
            "namespace cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockResourceApi;
    use crate::testing::{deployment, server_error, FakeApi, Step};
    use k8s_openapi::api::apps::v1::Deployment;
    use std::time::Duration;

    fn fake_with(objects: Vec<Deployment>) -> Arc<FakeApi<Deployment>> {
        Arc::new(FakeApi::with_objects(objects))
    }

    #[tokio::test]
    async fn create_then_exists_is_true() {
        let api = fake_with(vec![]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1));

        handle.create().await.unwrap();
        assert!(handle.object().is_some());
        assert!(handle.exists().await.unwrap());
        assert_eq!(api.calls().create, 1);
    }

    #[tokio::test]
    async fn create_is_a_no_op_when_object_exists() {
        let mut mock = MockResourceApi::<Deployment>::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Ok(deployment("web", "tnf", 1)));
        mock.expect_create().times(0);

        let mut handle = ResourceHandle::new(Arc::new(mock), deployment("web", "tnf", 3));
        handle.create().await.unwrap();

        assert!(handle.object().is_some());
    }

    #[tokio::test]
    async fn gate_rejects_empty_identity_without_remote_calls() {
        let api = fake_with(vec![]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("", "tnf", 1));

        let err = handle.create().await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("name cannot be empty"));
        assert!(handle.exists().await.is_err());
        assert!(handle.delete().await.is_err());
        assert_eq!(api.calls().total(), 0);
    }

    #[tokio::test]
    async fn gate_rejects_missing_client() {
        let mut handle = ResourceHandle::offline(deployment("web", "tnf", 1));
        let err = handle.create().await.unwrap_err();
        assert!(err.to_string().contains("client is not set"));

        let api = fake_with(vec![]);
        let mut handle = handle.with_api(api.clone());
        handle.create().await.unwrap();
        assert_eq!(api.calls().create, 1);
    }

    #[tokio::test]
    async fn deferred_error_blocks_every_operation() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        let handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1))
            .with_label("", "broken")
            .with_label("app", "web");

        assert!(handle.deferred_error().unwrap().contains("label key cannot be empty"));
        assert!(!handle.definition().metadata.labels.as_ref().is_some_and(|l| l.contains_key("app")));

        let mut handle = handle;
        for result in [
            handle.exists().await.map(|_| ()),
            handle.create().await,
            handle.update().await,
            handle.delete().await,
        ] {
            let err = result.unwrap_err();
            assert!(err.to_string().contains("label key cannot be empty"));
        }
        assert!(handle.build().is_err());
        assert_eq!(api.calls().total(), 0);
    }

    #[tokio::test]
    async fn configuration_chain_builds_definition() {
        let api = fake_with(vec![]);
        let handle = ResourceHandle::new(api, deployment("web", "tnf", 1))
            .with_label("app", "web")
            .with_annotation("owner", "qe")
            .build()
            .unwrap();

        let meta = &handle.definition().metadata;
        assert_eq!(meta.labels.as_ref().unwrap()["app"], "web");
        assert_eq!(meta.annotations.as_ref().unwrap()["owner"], "qe");
        assert!(handle.object().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let api = fake_with(vec![]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1));
        handle.create().await.unwrap();

        handle.delete().await.unwrap();
        assert!(handle.object().is_none());
        handle.delete().await.unwrap();
        assert!(handle.object().is_none());

        assert_eq!(api.calls().delete, 1);
        assert!(!handle.exists().await.unwrap());
    }

    #[tokio::test]
    async fn delete_treats_not_found_race_as_success() {
        let mut mock = MockResourceApi::<Deployment>::new();
        mock.expect_get()
            .returning(|_| Ok(deployment("web", "tnf", 1)));
        mock.expect_delete()
            .times(1)
            .returning(|key| Err(Error::not_found("Deployment", key.to_string())));

        let mut handle = ResourceHandle::new(Arc::new(mock), deployment("web", "tnf", 1));
        handle.delete().await.unwrap();
        assert!(handle.object().is_none());
    }

    #[tokio::test]
    async fn failed_delete_still_clears_observed_object() {
        let mut mock = MockResourceApi::<Deployment>::new();
        mock.expect_get()
            .returning(|_| Ok(deployment("web", "tnf", 1)));
        mock.expect_delete()
            .times(1)
            .returning(|_| Err(server_error()));

        let mut handle = ResourceHandle::new(Arc::new(mock), deployment("web", "tnf", 1));
        let err = handle.delete().await.unwrap_err();

        assert!(err.is_retryable());
        assert!(handle.object().is_none());
    }

    #[tokio::test]
    async fn strict_update_and_delete_stop_at_the_existence_error() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        api.script_get("web", vec![Step::ServerError]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 3));

        assert!(handle.update().await.unwrap_err().is_retryable());
        assert!(handle.delete().await.unwrap_err().is_retryable());
        assert_eq!(api.calls().update, 0);
        assert_eq!(api.calls().delete, 0);
    }

    #[tokio::test]
    async fn legacy_update_goes_ahead_after_existence_error() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        api.script_get("web", vec![Step::ServerError]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 3))
            .with_existence_policy(ExistencePolicy::Legacy);

        handle.update().await.unwrap();

        assert_eq!(api.calls().update, 1);
        let observed = handle.object().unwrap();
        assert_eq!(observed.spec.as_ref().unwrap().replicas, Some(3));
    }

    #[tokio::test]
    async fn legacy_delete_goes_ahead_after_existence_error() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        api.script_get("web", vec![Step::ServerError]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1))
            .with_existence_policy(ExistencePolicy::Legacy);

        handle.delete().await.unwrap();

        assert_eq!(api.calls().delete, 1);
        assert!(handle.object().is_none());
    }

    #[tokio::test]
    async fn pull_rejects_empty_namespace_without_remote_calls() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        let err = ResourceHandle::<Deployment>::pull(api.clone(), ObjectKey::namespaced("web", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("namespace cannot be empty"));
        assert_eq!(api.calls().total(), 0);
    }

    #[tokio::test]
    async fn update_requires_existence() {
        let api = fake_with(vec![]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1));

        let err = handle.update().await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(api.calls().update, 0);
    }

    #[tokio::test]
    async fn update_stores_server_response() {
        let api = fake_with(vec![deployment("web", "tnf", 1)]);
        let mut handle = ResourceHandle::<Deployment>::pull(api.clone(), ObjectKey::namespaced("web", "tnf"))
            .await
            .unwrap()
            .with_definition(|d| {
                d.spec.get_or_insert_with(Default::default).replicas = Some(4);
                Ok(())
            });

        handle.update().await.unwrap();
        let observed = handle.object().unwrap();
        assert_eq!(observed.spec.as_ref().unwrap().replicas, Some(4));
        assert_eq!(api.calls().update, 1);
    }

    #[tokio::test]
    async fn pull_of_missing_object_is_not_found() {
        let api = fake_with(vec![]);
        let err = ResourceHandle::<Deployment>::pull(api, ObjectKey::namespaced("web", "tnf"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn strict_policy_surfaces_server_errors() {
        let api = fake_with(vec![]);
        api.script_get("web", vec![Step::ServerError]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1));

        assert!(handle.exists().await.is_err());
        assert!(handle.create().await.is_err());
        assert_eq!(api.calls().create, 0);
    }

    #[tokio::test]
    async fn legacy_policy_reports_server_errors_as_existing() {
        let api = fake_with(vec![]);
        api.script_get("web", vec![Step::ServerError]);
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1))
            .with_existence_policy(ExistencePolicy::Legacy);

        assert!(handle.exists().await.unwrap());
        assert!(handle.object().is_none());
        handle.create().await.unwrap();
        assert_eq!(api.calls().create, 0);
    }

    #[tokio::test]
    async fn get_does_not_touch_observed_object() {
        let api = fake_with(vec![deployment("web", "tnf", 2)]);
        let handle = ResourceHandle::new(api, deployment("web", "tnf", 1));

        let current = handle.get().await.unwrap();
        assert_eq!(current.spec.unwrap().replicas, Some(2));
        assert!(handle.object().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_keeps_polling_through_absence() {
        let api = fake_with(vec![]);
        api.script_get(
            "web",
            vec![
                Step::Missing,
                Step::Object(deployment("web", "tnf", 1)),
                Step::Object(deployment("web", "tnf", 5)),
            ],
        );
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 5));
        let spec = PollSpec::new(Duration::from_secs(1), Duration::from_secs(30));

        handle
            .wait_until(&spec, "to scale", |d| {
                d.spec.as_ref().and_then(|s| s.replicas) == Some(5)
            })
            .await
            .unwrap();

        assert_eq!(api.calls().get, 3);
        assert!(handle.object().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_deleted_clears_observed_object() {
        let api = fake_with(vec![]);
        api.script_get(
            "web",
            vec![
                Step::Object(deployment("web", "tnf", 1)),
                Step::Object(deployment("web", "tnf", 1)),
                Step::Missing,
            ],
        );
        let mut handle = ResourceHandle::new(api.clone(), deployment("web", "tnf", 1));
        handle.exists().await.unwrap();
        assert!(handle.object().is_some());

        let spec = PollSpec::new(Duration::from_secs(1), Duration::from_secs(30));
        handle.wait_until_deleted(&spec).await.unwrap();
        assert!(handle.object().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_exists_times_out() {
        let api = fake_with(vec![]);
        let mut handle = ResourceHandle::new(api, deployment("web", "tnf", 1));
        let spec = PollSpec::new(Duration::from_secs(1), Duration::from_secs(3));

        let err = handle.wait_until_exists(&spec).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("Deployment tnf/web to exist"));
    }
}
