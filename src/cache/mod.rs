//! Read-only local mirrors of host-cluster objects
//!
//! The reconciler never performs remote reads to decide whether a resource
//! exists; it consults reflector-backed caches populated by the watch
//! machinery. Caches are eventually consistent: a stale cache can cause a
//! spurious create that surfaces as an "already exists" error, which the
//! next reconcile clears.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::reflector::{Lookup, ObjectRef, Store};

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Keyed lookup into the local mirror of one resource kind.
///
/// Keys are `<namespace>/<name>` for namespaced objects and the bare object
/// name for cluster-scoped ones.
#[cfg_attr(test, automock)]
pub trait ObjectCache<K: Send + Sync + 'static>: Send + Sync {
    /// Return the cached object for the key, or `None` when the mirror has
    /// not seen it.
    fn get_by_key(&self, key: &str) -> Result<Option<K>>;
}

/// Enumeration of every cached service, for NodePort allocation.
#[cfg_attr(test, automock)]
pub trait ServiceLister: Send + Sync {
    /// All services currently in the mirror, across all namespaces.
    fn services(&self) -> Result<Vec<Service>>;
}

/// Namespace-indexed view of the deployment mirror.
#[cfg_attr(test, automock)]
pub trait DeploymentIndex: Send + Sync {
    /// All deployments in the given namespace.
    fn by_namespace(&self, namespace: &str) -> Result<Vec<Deployment>>;
}

/// Cache implementation over a `kube` reflector store.
pub struct ReflectorCache<K>
where
    K: Lookup + Clone + 'static,
    K::DynamicType: std::hash::Hash + Eq + Clone,
{
    store: Store<K>,
}

impl<K> ReflectorCache<K>
where
    K: Lookup + Clone + 'static,
    K::DynamicType: std::hash::Hash + Eq + Clone,
{
    /// Wrap a reflector store reader.
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }
}

impl<K> ObjectCache<K> for ReflectorCache<K>
where
    K: Lookup<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get_by_key(&self, key: &str) -> Result<Option<K>> {
        let (namespace, name) = match key.split_once('/') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, key),
        };
        let mut obj_ref = ObjectRef::<K>::new(name);
        if let Some(ns) = namespace {
            obj_ref = obj_ref.within(ns);
        }
        Ok(self.store.get(&obj_ref).map(|o| (*o).clone()))
    }
}

impl ServiceLister for ReflectorCache<Service> {
    fn services(&self) -> Result<Vec<Service>> {
        Ok(self.store.state().iter().map(|s| (**s).clone()).collect())
    }
}

impl DeploymentIndex for ReflectorCache<Deployment> {
    fn by_namespace(&self, namespace: &str) -> Result<Vec<Deployment>> {
        Ok(self
            .store
            .state()
            .iter()
            .filter(|d| d.metadata.namespace.as_deref() == Some(namespace))
            .map(|d| (**d).clone())
            .collect())
    }
}
