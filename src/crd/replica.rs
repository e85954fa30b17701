//! ConfigMapReplica Custom Resource Definition
//!
//! A ConfigMapReplica is a cluster-scoped object that asks the controller to
//! keep one ConfigMap, built from `spec.template`, in every namespace whose
//! labels satisfy `spec.selector`.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ConfigMapReplicaCopy, ConfigMapTemplate};

/// Specification for a ConfigMapReplica
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "replica.example.com",
    version = "v1alpha1",
    kind = "ConfigMapReplica",
    plural = "configmapreplicas",
    shortname = "cmr",
    status = "ConfigMapReplicaStatus",
    printcolumn = r#"{"name":"Selector","type":"string","jsonPath":".spec.selector"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReplicaSpec {
    /// Data and labels replicated into every matching namespace
    pub template: ConfigMapTemplate,

    /// Namespace label selector. Every pair must be present on a namespace
    /// for it to receive a copy; an empty selector matches all namespaces.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

/// Status for a ConfigMapReplica
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReplicaStatus {
    /// Status of each replicated ConfigMap. Always serialized, so a status
    /// write with no matching namespaces clears the stored list.
    #[serde(default)]
    pub config_map_statuses: Vec<ConfigMapReplicaCopy>,
}

impl ConfigMapReplicaStatus {
    /// Find the entry for the copy at `namespace/name`
    pub fn copy(&self, name: &str, namespace: &str) -> Option<&ConfigMapReplicaCopy> {
        self.config_map_statuses
            .iter()
            .find(|c| c.is_for(name, namespace))
    }

    /// Number of copies whose last apply succeeded
    pub fn ready_count(&self) -> usize {
        self.config_map_statuses.iter().filter(|c| c.ready).count()
    }

    /// True when there is exactly one ready entry per expected namespace
    pub fn is_converged(&self, expected_namespaces: usize) -> bool {
        self.config_map_statuses.len() == expected_namespaces
            && self.config_map_statuses.iter().all(|c| c.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    fn entry(namespace: &str, ready: bool) -> ConfigMapReplicaCopy {
        ConfigMapReplicaCopy {
            name: "replica".to_string(),
            namespace: namespace.to_string(),
            ready,
            ..Default::default()
        }
    }

    #[test]
    fn crd_is_cluster_scoped() {
        let crd = ConfigMapReplica::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "replica.example.com");
        assert_eq!(crd.spec.names.kind, "ConfigMapReplica");
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("configmapreplicas.replica.example.com")
        );
    }

    #[test]
    fn spec_round_trips_camel_case() {
        let spec: ConfigMapReplicaSpec = serde_json::from_value(serde_json::json!({
            "template": {"labels": {"app": "web"}, "data": {"file.yaml": "v1"}},
            "selector": {"team": "infra"}
        }))
        .unwrap();
        assert_eq!(spec.selector.get("team").map(String::as_str), Some("infra"));
        assert_eq!(spec.template.labels.get("app").map(String::as_str), Some("web"));
    }

    #[test]
    fn status_serializes_config_map_statuses_key() {
        let status = ConfigMapReplicaStatus {
            config_map_statuses: vec![entry("ops", true)],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("configMapStatuses").is_some());
    }

    #[test]
    fn empty_status_keeps_config_map_statuses_key() {
        let json = serde_json::to_value(ConfigMapReplicaStatus::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "configMapStatuses": [] }));
    }

    #[test]
    fn convergence_requires_all_ready_and_matching_count() {
        let status = ConfigMapReplicaStatus {
            config_map_statuses: vec![entry("ops", true), entry("dev", false)],
        };
        assert!(!status.is_converged(2));
        assert_eq!(status.ready_count(), 1);
        assert!(status.copy("replica", "dev").is_some_and(|c| !c.ready));

        let status = ConfigMapReplicaStatus {
            config_map_statuses: vec![entry("ops", true), entry("dev", true)],
        };
        assert!(status.is_converged(2));
        assert!(!status.is_converged(3));
    }
}
