//! Kubernetes API backed store

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::ReplicaStore;
use crate::crd::ConfigMapReplica;
use crate::resolver::render_selector;
use crate::Error;

/// Real store implementation wrapping a kube [`Client`]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create a new KubeStore. `field_manager` is recorded on every write.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

/// Merge patch body for a status write.
///
/// `configMapStatuses` is always present: a merge patch leaves missing keys
/// untouched, so an empty list must be sent explicitly to clear stale entries.
/// `resourceVersion` makes the API server reject the patch with 409 when the
/// replica changed since it was read.
fn status_patch(replica: &ConfigMapReplica) -> Result<serde_json::Value, Error> {
    let status = replica.status.clone().unwrap_or_default();
    Ok(serde_json::json!({
        "metadata": { "resourceVersion": replica.resource_version() },
        "status": serde_json::to_value(&status)?,
    }))
}

fn namespace_of(config_map: &ConfigMap) -> Result<String, Error> {
    config_map
        .namespace()
        .ok_or_else(|| Error::internal("kube_store", "ConfigMap has no namespace"))
}

#[async_trait]
impl ReplicaStore for KubeStore {
    async fn get_replica(&self, name: &str) -> Result<Option<ConfigMapReplica>, Error> {
        let api: Api<ConfigMapReplica> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, "ConfigMapReplica", name, false))
    }

    async fn list_namespaces(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Namespace>, Error> {
        let rendered = render_selector(selector);
        let api: Api<Namespace> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if !rendered.is_empty() {
            params = params.labels(&rendered);
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| Error::scope_list(&rendered, e.to_string()))?;
        debug!(selector = %rendered, count = list.items.len(), "listed namespaces");
        Ok(list.items)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        self.config_maps(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, "ConfigMap", &format!("{namespace}/{name}"), false))
    }

    async fn list_config_maps_named(&self, name: &str) -> Result<Vec<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("metadata.name={name}"));
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let namespace = namespace_of(config_map)?;
        let name = config_map.name_any();
        self.config_maps(&namespace)
            .create(&self.post_params(), config_map)
            .await
            .map_err(|e| Error::from_kube(e, "ConfigMap", &format!("{namespace}/{name}"), true))
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let namespace = namespace_of(config_map)?;
        let name = config_map.name_any();
        self.config_maps(&namespace)
            .replace(&name, &self.post_params(), config_map)
            .await
            .map_err(|e| Error::from_kube(e, "ConfigMap", &format!("{namespace}/{name}"), false))
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.config_maps(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(e, "ConfigMap", &format!("{namespace}/{name}"), false))
    }

    async fn update_replica_status(
        &self,
        replica: &ConfigMapReplica,
    ) -> Result<ConfigMapReplica, Error> {
        let name = replica.name_any();
        let api: Api<ConfigMapReplica> = Api::all(self.client.clone());

        let patch = status_patch(replica)?;

        api.patch_status(
            &name,
            &PatchParams {
                field_manager: Some(self.field_manager.clone()),
                ..Default::default()
            },
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::from_kube(e, "ConfigMapReplica", &name, false))
    }
}
