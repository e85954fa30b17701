//! Supporting types for the ConfigMapReplica CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Template stamped onto every replicated ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapTemplate {
    /// Labels given to each replicated ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Data replicated into each ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

/// Observed state of one replicated ConfigMap
///
/// Entries are keyed by `(name, namespace)`; their position in the status
/// list carries no meaning.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapReplicaCopy {
    /// Name of the replicated ConfigMap
    pub name: String,

    /// Namespace of the replicated ConfigMap
    pub namespace: String,

    /// True when the last apply of this copy succeeded
    pub ready: bool,

    /// CamelCase reason for not being ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail for `reason`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the copy was checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,

    /// Last time the copy's readiness changed or it was rewritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ConfigMapReplicaCopy {
    /// Whether this entry describes the copy at `namespace/name`
    pub fn is_for(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }
}
