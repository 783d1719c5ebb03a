//! In-memory [`ResourceApi`] for multi-step scenarios
//!
//! Objects live in a map keyed by name. Per-name scripts override `get` with
//! a sequence of outcomes (the last step repeats), and a list script does the
//! same for `list`. Every call is counted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use parking_lot::Mutex;

use certsuite_common::{Error, Result};

use crate::api::{kind_of, ListSelector, ManagedObject, ObjectKey, ResourceApi};

/// One scripted outcome of a `get`
#[derive(Clone, Debug)]
pub(crate) enum Step<K> {
    Object(K),
    Missing,
    ServerError,
}

/// Call counts per operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Calls {
    pub get: usize,
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.get + self.list + self.create + self.update + self.delete
    }
}

#[derive(Default)]
struct Counters {
    get: AtomicUsize,
    list: AtomicUsize,
    create: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

pub(crate) struct FakeApi<K> {
    objects: Mutex<BTreeMap<String, K>>,
    get_scripts: Mutex<HashMap<String, VecDeque<Step<K>>>>,
    list_script: Mutex<VecDeque<Vec<K>>>,
    counters: Counters,
}

impl<K: ManagedObject> FakeApi<K> {
    pub fn new() -> Self {
        Self::with_objects(Vec::new())
    }

    pub fn with_objects(objects: Vec<K>) -> Self {
        Self {
            objects: Mutex::new(objects.into_iter().map(|o| (o.name_any(), o)).collect()),
            get_scripts: Mutex::new(HashMap::new()),
            list_script: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
        }
    }

    /// Script the outcomes of `get` for `name`; the last step repeats
    pub fn script_get(&self, name: &str, steps: Vec<Step<K>>) {
        self.get_scripts
            .lock()
            .insert(name.to_string(), steps.into());
    }

    /// Script the results of `list`; the last result repeats
    pub fn script_list(&self, results: Vec<Vec<K>>) {
        *self.list_script.lock() = results.into();
    }

    pub fn calls(&self) -> Calls {
        Calls {
            get: self.counters.get.load(Ordering::SeqCst),
            list: self.counters.list.load(Ordering::SeqCst),
            create: self.counters.create.load(Ordering::SeqCst),
            update: self.counters.update.load(Ordering::SeqCst),
            delete: self.counters.delete.load(Ordering::SeqCst),
        }
    }

    fn scripted_get(&self, key: &ObjectKey) -> Option<Step<K>> {
        let mut scripts = self.get_scripts.lock();
        let steps = scripts.get_mut(&key.name)?;
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

pub(crate) fn server_error() -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "the server is currently unable to handle the request".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

#[async_trait]
impl<K: ManagedObject> ResourceApi<K> for FakeApi<K> {
    async fn get(&self, key: &ObjectKey) -> Result<K> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let missing = || Error::not_found(kind_of::<K>(), key.to_string());
        match self.scripted_get(key) {
            Some(Step::Object(obj)) => Ok(obj),
            Some(Step::Missing) => Err(missing()),
            Some(Step::ServerError) => Err(server_error()),
            None => self.objects.lock().get(&key.name).cloned().ok_or_else(missing),
        }
    }

    async fn list(&self, _selector: &ListSelector) -> Result<Vec<K>> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        let mut script = self.list_script.lock();
        let scripted = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match scripted {
            Some(items) => Ok(items),
            None => Ok(self.objects.lock().values().cloned().collect()),
        }
    }

    async fn create(&self, object: &K) -> Result<K> {
        self.counters.create.fetch_add(1, Ordering::SeqCst);
        let mut created = object.clone();
        created.meta_mut().resource_version = Some("1".to_string());
        self.objects
            .lock()
            .insert(created.name_any(), created.clone());
        Ok(created)
    }

    async fn update(&self, object: &K) -> Result<K> {
        self.counters.update.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock();
        let name = object.name_any();
        if !objects.contains_key(&name) {
            return Err(Error::not_found(kind_of::<K>(), name));
        }
        objects.insert(name, object.clone());
        Ok(object.clone())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .remove(&key.name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind_of::<K>(), key.to_string()))
    }
}

/// Minimal deployment with `replicas` desired and no status
pub(crate) fn deployment(name: &str, namespace: &str, replicas: i32) -> Deployment {
    let selector: BTreeMap<String, String> =
        [("certsuite-qe/app".to_string(), name.to_string())].into();
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: None,
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Node with a Ready condition of the given status
pub(crate) fn node(name: &str, ready: bool) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}
