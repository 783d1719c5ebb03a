//! Collaborator API over the remote cluster-state store
//!
//! Provides a trait-based abstraction for the five point operations the
//! engine needs, allowing tests to mock Kubernetes interactions while
//! production code uses real API calls through [`KubeApi`].

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use certsuite_common::{Error, Result, FIELD_MANAGER};

/// Bound shared by every typed state plugged into the engine
pub trait ManagedObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static
{
}

impl<T> ManagedObject for T where
    T: Resource<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static
{
}

/// Kind name of a managed object type (e.g. "Deployment")
pub fn kind_of<K: ManagedObject>() -> String {
    K::kind(&()).into_owned()
}

/// Identity of a remote object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Object name
    pub name: String,
    /// Namespace; `None` for cluster-scoped objects
    pub namespace: Option<String>,
}

impl ObjectKey {
    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Key for a namespaced object
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Key read from an object's metadata
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            name: obj.meta().name.clone().unwrap_or_default(),
            namespace: obj.meta().namespace.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Label and field selectors for a List call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListSelector {
    /// Label selector, e.g. `node-role.kubernetes.io/worker=`
    pub labels: Option<String>,
    /// Field selector, e.g. `metadata.name=worker`
    pub fields: Option<String>,
}

impl ListSelector {
    /// Select every object
    pub fn all() -> Self {
        Self::default()
    }

    /// Select by label expression
    pub fn labels(selector: impl Into<String>) -> Self {
        Self {
            labels: Some(selector.into()),
            fields: None,
        }
    }

    /// Add a field selector
    pub fn with_fields(mut self, selector: impl Into<String>) -> Self {
        self.fields = Some(selector.into());
        self
    }

    /// Convert into kube list parameters
    pub fn to_list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(labels) = &self.labels {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.fields {
            params = params.fields(fields);
        }
        params
    }
}

/// Point operations against the remote store.
///
/// Implementations must report absence as an error for which
/// [`Error::is_not_found`] is true; every other failure is treated as a
/// transient or terminal server error according to [`Error::is_retryable`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApi<K: Send + Sync + 'static>: Send + Sync {
    /// Fetch one object by identity
    async fn get(&self, key: &ObjectKey) -> Result<K>;

    /// List objects matching a selector
    async fn list(&self, selector: &ListSelector) -> Result<Vec<K>>;

    /// Create an object, returning the server's view of it
    async fn create(&self, object: &K) -> Result<K>;

    /// Replace an object, returning the server's view of it
    async fn update(&self, object: &K) -> Result<K>;

    /// Delete an object by identity
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}

/// Production [`ResourceApi`] backed by a scoped `kube::Api`
pub struct KubeApi<K> {
    api: Api<K>,
    namespace: Option<String>,
}

impl<K> KubeApi<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    /// API scoped to one namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: Some(namespace.to_string()),
        }
    }
}

impl<K> KubeApi<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    /// API over cluster-scoped objects (or all namespaces, for listing)
    pub fn all(client: Client) -> Self {
        Self {
            api: Api::all(client),
            namespace: None,
        }
    }
}

impl<K: ManagedObject> KubeApi<K> {
    fn check_scope(&self, key: &ObjectKey) -> Result<()> {
        match (&self.namespace, &key.namespace) {
            (Some(scope), Some(ns)) if scope != ns => Err(Error::validation_for_field(
                key.to_string(),
                "metadata.namespace",
                format!("api is scoped to namespace {}", scope),
            )),
            _ => Ok(()),
        }
    }

    fn classify(err: kube::Error, key: &ObjectKey) -> Error {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Error::not_found(kind_of::<K>(), key.to_string()),
            other => Error::from(other),
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K> ResourceApi<K> for KubeApi<K>
where
    K: ManagedObject + Serialize + DeserializeOwned,
{
    async fn get(&self, key: &ObjectKey) -> Result<K> {
        self.check_scope(key)?;
        trace!(kind = %kind_of::<K>(), key = %key, "GET");
        self.api
            .get(&key.name)
            .await
            .map_err(|e| Self::classify(e, key))
    }

    async fn list(&self, selector: &ListSelector) -> Result<Vec<K>> {
        trace!(kind = %kind_of::<K>(), labels = ?selector.labels, fields = ?selector.fields, "LIST");
        let list = self.api.list(&selector.to_list_params()).await?;
        Ok(list.items)
    }

    async fn create(&self, object: &K) -> Result<K> {
        let key = ObjectKey::of(object);
        self.check_scope(&key)?;
        self.api
            .create(&post_params(), object)
            .await
            .map_err(|e| Self::classify(e, &key))
    }

    async fn update(&self, object: &K) -> Result<K> {
        let key = ObjectKey::of(object);
        self.check_scope(&key)?;
        self.api
            .replace(&object.name_any(), &post_params(), object)
            .await
            .map_err(|e| Self::classify(e, &key))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.check_scope(key)?;
        self.api
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Self::classify(e, key))
    }
}
