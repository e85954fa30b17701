//! Store abstraction consumed by the reconciliation engine
//!
//! The engine never talks to the Kubernetes API directly. Every read and
//! write goes through [`ReplicaStore`], so the same algorithm runs against
//! the real API server ([`KubeStore`]) and against an in-memory fake
//! ([`MemoryStore`]) in tests.
//!
//! All calls are blocking from the engine's point of view: each is awaited
//! before the next step runs.

mod kube_api;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};

#[cfg(test)]
use mockall::automock;

use crate::crd::ConfigMapReplica;
use crate::Error;

pub use self::kube_api::KubeStore;
pub use self::memory::{MemoryStore, WriteCounts};

/// Trait abstracting the object store the controller reads from and writes to
///
/// Implementations map "object missing" on reads to `Ok(None)` and classify
/// write failures into [`Error::Conflict`], [`Error::AlreadyExists`] and
/// [`Error::NotFound`] where the store can tell them apart.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Fetch a ConfigMapReplica by name
    async fn get_replica(&self, name: &str) -> Result<Option<ConfigMapReplica>, Error>;

    /// List namespaces whose labels contain every pair in `selector`
    async fn list_namespaces(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Namespace>, Error>;

    /// Fetch a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// List ConfigMaps with the given name across all namespaces
    async fn list_config_maps_named(&self, name: &str) -> Result<Vec<ConfigMap>, Error>;

    /// Create a ConfigMap in the namespace set on its metadata
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Replace a ConfigMap. The object's resourceVersion, when present, is
    /// checked against the stored one.
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Delete a ConfigMap
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Write the status of a ConfigMapReplica.
    ///
    /// The replica's resourceVersion is the precondition: a stale version
    /// yields [`Error::Conflict`].
    async fn update_replica_status(
        &self,
        replica: &ConfigMapReplica,
    ) -> Result<ConfigMapReplica, Error>;
}
