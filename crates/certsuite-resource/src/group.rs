//! Entity sets for the fleet-level algorithms
//!
//! A set is either an explicit list of identities or a selector. Named sets
//! are fetched one Get per entity with bounded concurrency; results keep the
//! order of the input keys.

use futures::stream::{self, StreamExt};

use certsuite_common::{Error, Result};

use crate::api::{ListSelector, ManagedObject, ObjectKey, ResourceApi};

/// The entities a fleet wait observes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntitySet {
    /// Fixed identities; a missing entity is an error
    Named(Vec<ObjectKey>),
    /// Whatever the selector matches at each sample
    Selected(ListSelector),
}

impl EntitySet {
    /// Cluster-scoped entities by name
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(ObjectKey::cluster).collect())
    }

    /// Reject a named set with no members
    pub fn validate(&self) -> Result<()> {
        match self {
            EntitySet::Named(keys) if keys.is_empty() => {
                Err(Error::validation("entity set cannot be empty"))
            }
            EntitySet::Named(keys) => match keys.iter().find(|k| k.name.is_empty()) {
                Some(_) => Err(Error::validation_for_field(
                    "entity set",
                    "metadata.name",
                    "entity name cannot be empty",
                )),
                None => Ok(()),
            },
            EntitySet::Selected(_) => Ok(()),
        }
    }
}

/// Fetch each key, at most `concurrency` requests in flight
pub async fn fetch_each<K: ManagedObject>(
    api: &dyn ResourceApi<K>,
    keys: &[ObjectKey],
    concurrency: usize,
) -> Vec<(ObjectKey, Result<K>)> {
    stream::iter(keys.iter().cloned())
        .map(|key| async move {
            let result = api.get(&key).await;
            (key, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Fetch the current members of `set`
pub async fn fetch_entities<K: ManagedObject>(
    api: &dyn ResourceApi<K>,
    set: &EntitySet,
    concurrency: usize,
) -> Result<Vec<K>> {
    match set {
        EntitySet::Selected(selector) => api.list(selector).await,
        EntitySet::Named(keys) => fetch_each(api, keys, concurrency)
            .await
            .into_iter()
            .map(|(_, result)| result)
            .collect(),
    }
}
