//! Write access to the host cluster, one writer per resource kind
//!
//! Writers are the only path through which the reconciler mutates the host
//! cluster. They are deliberately minimal: create and delete, scoped to a
//! namespace or cluster-wide. Everything else (probing, generation,
//! ordering) lives above this seam, which keeps the pipeline mockable.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Create/delete access for one resource kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectWriter<K: Send + Sync + 'static>: Send + Sync {
    /// Create the object, returning the server's view of it.
    async fn create<'a>(&'a self, namespace: Option<&'a str>, object: &'a K) -> Result<K>;

    /// Delete the named object.
    async fn delete<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> Result<()>;
}

/// Writer for namespaced kinds backed by the kube client.
pub struct NamespacedWriter<K> {
    client: Client,
    kind: &'static str,
    _marker: PhantomData<fn() -> K>,
}

impl<K> NamespacedWriter<K> {
    /// Create a writer; `kind` is the short label used in error messages
    /// (e.g. "secret").
    pub fn new(client: Client, kind: &'static str) -> Self {
        Self {
            client,
            kind,
            _marker: PhantomData,
        }
    }

    fn require_namespace<'a>(&self, namespace: Option<&'a str>) -> Result<&'a str> {
        namespace.ok_or_else(|| {
            Error::internal(format!("{} writer called without a namespace", self.kind))
        })
    }
}

#[async_trait]
impl<K> ObjectWriter<K> for NamespacedWriter<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn create<'a>(&'a self, namespace: Option<&'a str>, object: &'a K) -> Result<K> {
        let ns = self.require_namespace(namespace)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| Error::CreateFailed {
                kind: self.kind.to_string(),
                name: object.name_any(),
                source: e,
            })
    }

    async fn delete<'a>(&'a self, namespace: Option<&'a str>, name: &'a str) -> Result<()> {
        let ns = self.require_namespace(namespace)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::DeleteFailed {
                kind: self.kind.to_string(),
                name: name.to_string(),
                source: e,
            })
    }
}

/// Writer for cluster-scoped kinds backed by the kube client.
pub struct ClusterWriter<K> {
    client: Client,
    kind: &'static str,
    _marker: PhantomData<fn() -> K>,
}

impl<K> ClusterWriter<K> {
    /// Create a writer; `kind` is the short label used in error messages.
    pub fn new(client: Client, kind: &'static str) -> Self {
        Self {
            client,
            kind,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ObjectWriter<K> for ClusterWriter<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn create<'a>(&'a self, _namespace: Option<&'a str>, object: &'a K) -> Result<K> {
        let api: Api<K> = Api::all(self.client.clone());
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| Error::CreateFailed {
                kind: self.kind.to_string(),
                name: object.name_any(),
                source: e,
            })
    }

    async fn delete<'a>(&'a self, _namespace: Option<&'a str>, name: &'a str) -> Result<()> {
        let api: Api<K> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::DeleteFailed {
                kind: self.kind.to_string(),
                name: name.to_string(),
                source: e,
            })
    }
}
