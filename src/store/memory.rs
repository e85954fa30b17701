//! In-memory store for tests and local experiments
//!
//! Behaves like a tiny API server: objects get a uid and a monotonically
//! increasing resourceVersion, writes with a stale resourceVersion fail with
//! a conflict, and status writes only touch `.status`. Faults can be injected
//! per namespace so partial failures can be exercised deterministically.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::ReplicaStore;
use crate::crd::ConfigMapReplica;
use crate::resolver::{render_selector, selector_matches};
use crate::Error;

/// Number of successful writes the store has accepted, by operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteCounts {
    /// ConfigMap creates
    pub creates: u32,
    /// ConfigMap updates
    pub updates: u32,
    /// ConfigMap deletes
    pub deletes: u32,
    /// ConfigMapReplica status writes
    pub status_updates: u32,
}

impl WriteCounts {
    /// Writes that touched ConfigMaps
    pub fn config_map_writes(&self) -> u32 {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Default)]
struct Faults {
    get: BTreeMap<String, String>,
    create: BTreeMap<String, String>,
    update: BTreeMap<String, String>,
    list_namespaces: Option<String>,
    status_conflicts: u32,
}

#[derive(Default)]
struct State {
    replicas: BTreeMap<String, ConfigMapReplica>,
    namespaces: BTreeMap<String, Namespace>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    next_version: u64,
    faults: Faults,
    writes: WriteCounts,
}

impl State {
    fn bump(&mut self, meta: &mut ObjectMeta) {
        self.next_version += 1;
        meta.resource_version = Some(self.next_version.to_string());
    }

    fn stamp_new(&mut self, meta: &mut ObjectMeta) {
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        self.bump(meta);
    }
}

/// In-memory [`ReplicaStore`] with fault injection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or relabel) a namespace
    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut state = self.lock();
        let mut ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        };
        state.stamp_new(&mut ns.metadata);
        state.namespaces.insert(name.to_string(), ns);
    }

    /// Add a replica as an author would, assigning uid and resourceVersion.
    /// Returns the stored object.
    pub fn add_replica(&self, mut replica: ConfigMapReplica) -> ConfigMapReplica {
        let mut state = self.lock();
        state.stamp_new(&mut replica.metadata);
        state
            .replicas
            .insert(replica.name_any(), replica.clone());
        replica
    }

    /// Apply an author edit to a stored replica, bumping its resourceVersion
    pub fn modify_replica(&self, name: &str, edit: impl FnOnce(&mut ConfigMapReplica)) {
        let mut state = self.lock();
        let Some(mut replica) = state.replicas.remove(name) else {
            return;
        };
        edit(&mut replica);
        state.bump(&mut replica.metadata);
        state.replicas.insert(name.to_string(), replica);
    }

    /// Remove a replica
    pub fn delete_replica(&self, name: &str) {
        self.lock().replicas.remove(name);
    }

    /// Current stored replica
    pub fn replica(&self, name: &str) -> Option<ConfigMapReplica> {
        self.lock().replicas.get(name).cloned()
    }

    /// Current stored ConfigMap
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.lock()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored ConfigMaps, ordered by namespace then name
    pub fn config_maps(&self) -> Vec<ConfigMap> {
        self.lock().config_maps.values().cloned().collect()
    }

    /// Write a ConfigMap directly, bypassing write counters and faults.
    ///
    /// Simulates changes made by someone other than the controller.
    pub fn put_config_map(&self, mut config_map: ConfigMap) {
        let key = (config_map.namespace().unwrap_or_default(), config_map.name_any());
        let mut state = self.lock();
        let uid = state
            .config_maps
            .get(&key)
            .and_then(|existing| existing.metadata.uid.clone());
        config_map.metadata.uid = uid.or(config_map.metadata.uid);
        state.stamp_new(&mut config_map.metadata);
        state.config_maps.insert(key, config_map);
    }

    /// Fail every ConfigMap read in `namespace`
    pub fn fail_get_in(&self, namespace: &str, message: &str) {
        self.lock()
            .faults
            .get
            .insert(namespace.to_string(), message.to_string());
    }

    /// Fail every ConfigMap create in `namespace`
    pub fn fail_create_in(&self, namespace: &str, message: &str) {
        self.lock()
            .faults
            .create
            .insert(namespace.to_string(), message.to_string());
    }

    /// Fail every ConfigMap update in `namespace`
    pub fn fail_update_in(&self, namespace: &str, message: &str) {
        self.lock()
            .faults
            .update
            .insert(namespace.to_string(), message.to_string());
    }

    /// Fail namespace listing
    pub fn fail_namespace_list(&self, message: &str) {
        self.lock().faults.list_namespaces = Some(message.to_string());
    }

    /// Reject the next `count` status writes with a conflict, as if another
    /// writer got there first
    pub fn conflict_next_status_updates(&self, count: u32) {
        self.lock().faults.status_conflicts = count;
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    /// Successful writes so far
    pub fn writes(&self) -> WriteCounts {
        self.lock().writes
    }
}

fn config_map_key(config_map: &ConfigMap) -> Result<(String, String), Error> {
    let namespace = config_map
        .namespace()
        .ok_or_else(|| Error::internal("memory_store", "ConfigMap has no namespace"))?;
    Ok((namespace, config_map.name_any()))
}

#[async_trait]
impl ReplicaStore for MemoryStore {
    async fn get_replica(&self, name: &str) -> Result<Option<ConfigMapReplica>, Error> {
        Ok(self.replica(name))
    }

    async fn list_namespaces(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Namespace>, Error> {
        let state = self.lock();
        if let Some(message) = &state.faults.list_namespaces {
            return Err(Error::scope_list(render_selector(selector), message));
        }
        Ok(state
            .namespaces
            .values()
            .filter(|ns| selector_matches(selector, ns.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let state = self.lock();
        if let Some(message) = state.faults.get.get(namespace) {
            return Err(Error::store("get", message));
        }
        Ok(state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_config_maps_named(&self, name: &str) -> Result<Vec<ConfigMap>, Error> {
        Ok(self
            .lock()
            .config_maps
            .values()
            .filter(|cm| cm.metadata.name.as_deref() == Some(name))
            .cloned()
            .collect())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let key = config_map_key(config_map)?;
        let mut state = self.lock();
        if let Some(message) = state.faults.create.get(&key.0) {
            return Err(Error::store("create", message));
        }
        if !state.namespaces.contains_key(&key.0) {
            return Err(Error::not_found("Namespace", &key.0));
        }
        if state.config_maps.contains_key(&key) {
            return Err(Error::already_exists("ConfigMap", format!("{}/{}", key.0, key.1)));
        }

        let mut created = config_map.clone();
        created.metadata.uid = None;
        state.stamp_new(&mut created.metadata);
        state.config_maps.insert(key, created.clone());
        state.writes.creates += 1;
        Ok(created)
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let key = config_map_key(config_map)?;
        let display = format!("{}/{}", key.0, key.1);
        let mut state = self.lock();
        if let Some(message) = state.faults.update.get(&key.0) {
            return Err(Error::store("update", message));
        }
        let Some(current) = state.config_maps.get(&key) else {
            return Err(Error::not_found("ConfigMap", display));
        };
        if let Some(version) = config_map.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(version) {
                return Err(Error::conflict(
                    "ConfigMap",
                    display,
                    "the object has been modified",
                ));
            }
        }

        let mut updated = config_map.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        state.bump(&mut updated.metadata);
        state.config_maps.insert(key, updated.clone());
        state.writes.updates += 1;
        Ok(updated)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.lock();
        match state
            .config_maps
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => {
                state.writes.deletes += 1;
                Ok(())
            }
            None => Err(Error::not_found("ConfigMap", format!("{namespace}/{name}"))),
        }
    }

    async fn update_replica_status(
        &self,
        replica: &ConfigMapReplica,
    ) -> Result<ConfigMapReplica, Error> {
        let name = replica.name_any();
        let mut state = self.lock();
        if state.faults.status_conflicts > 0 {
            state.faults.status_conflicts -= 1;
            return Err(Error::conflict(
                "ConfigMapReplica",
                name,
                "the object has been modified",
            ));
        }
        let Some(mut stored) = state.replicas.get(&name).cloned() else {
            return Err(Error::not_found("ConfigMapReplica", name));
        };
        if stored.metadata.resource_version != replica.metadata.resource_version {
            return Err(Error::conflict(
                "ConfigMapReplica",
                name,
                "the object has been modified",
            ));
        }

        stored.status = replica.status.clone();
        state.bump(&mut stored.metadata);
        state.replicas.insert(name, stored.clone());
        state.writes.status_updates += 1;
        Ok(stored)
    }
}
