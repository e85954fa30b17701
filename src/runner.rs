//! Controller runner - wires the reconciler to its watches
//!
//! A replica is reconciled when it changes, when one of its copies changes
//! (so drift and deletion are repaired), and when a namespace it selects or
//! currently reports on is created, relabelled or deleted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};

use crate::config::ControllerConfig;
use crate::controller::{error_policy, reconcile, Context};
use crate::crd::ConfigMapReplica;
use crate::resolver::selector_matches;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the ConfigMapReplica controller future
pub fn build_replica_controller(
    client: Client,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(Context::from_client(client.clone(), config));

    let replicas: Api<ConfigMapReplica> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client);

    tracing::info!("- ConfigMapReplica controller");

    let controller = Controller::new(
        replicas,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let cache = controller.store();

    // Copies can land in any namespace, so ConfigMaps are watched cluster-wide.
    // `watches` only streams events through the mapper and keeps no store, so
    // memory does not grow with the number of ConfigMaps. Events for
    // ConfigMaps no replica controls map to nothing.
    Box::pin(
        controller
            .watches(
                config_maps,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                |cm| replicas_owning(&cm),
            )
            .watches(
                namespaces,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                move |ns| {
                    let affected = replicas_for_namespace(&cache.state(), &ns);
                    tracing::debug!(
                        namespace = %ns.name_any(),
                        affected_count = affected.len(),
                        "Namespace changed, re-reconciling replicas"
                    );
                    affected
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("ConfigMapReplica")),
    )
}

/// Run the controller until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) {
    build_replica_controller(client, config).await;
    tracing::info!("controller shut down");
}

/// Replicas named in the controller owner references of a ConfigMap.
///
/// ConfigMapReplica is cluster-scoped, so the reference carries no namespace.
pub fn replicas_owning(config_map: &ConfigMap) -> Vec<ObjectRef<ConfigMapReplica>> {
    let api_version = ConfigMapReplica::api_version(&());
    let kind = ConfigMapReplica::kind(&());
    config_map
        .owner_references()
        .iter()
        .filter(|r| r.controller == Some(true) && r.api_version == api_version && r.kind == kind)
        .map(|r| ObjectRef::new(&r.name))
        .collect()
}

/// Replicas that must be re-evaluated when `namespace` changes: those whose
/// selector matches it now and those whose status still lists it.
pub fn replicas_for_namespace(
    replicas: &[Arc<ConfigMapReplica>],
    namespace: &Namespace,
) -> Vec<ObjectRef<ConfigMapReplica>> {
    let name = namespace.name_any();
    replicas
        .iter()
        .filter(|replica| {
            selector_matches(&replica.spec.selector, namespace.metadata.labels.as_ref())
                || replica
                    .status
                    .as_ref()
                    .is_some_and(|s| s.config_map_statuses.iter().any(|c| c.namespace == name))
        })
        .map(|replica| ObjectRef::from_obj(replica.as_ref()))
        .collect()
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::crd::{ConfigMapReplicaCopy, ConfigMapReplicaSpec, ConfigMapReplicaStatus};
    use crate::owner::TypeScheme;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn replica(name: &str, selector: &[(&str, &str)]) -> Arc<ConfigMapReplica> {
        let mut r = ConfigMapReplica::new(
            name,
            ConfigMapReplicaSpec {
                selector: selector
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            },
        );
        r.metadata.uid = Some(format!("uid-{name}"));
        Arc::new(r)
    }

    fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(refs: Vec<ObjectRef<ConfigMapReplica>>) -> Vec<String> {
        let mut names: Vec<String> = refs.into_iter().map(|r| r.name).collect();
        names.sort();
        names
    }

    #[test]
    fn namespace_change_triggers_matching_replicas() {
        let replicas = vec![
            replica("infra", &[("team", "infra")]),
            replica("frontend", &[("team", "frontend")]),
            replica("everywhere", &[]),
        ];

        let affected = replicas_for_namespace(&replicas, &namespace("ops", &[("team", "infra")]));
        assert_eq!(names(affected), vec!["everywhere", "infra"]);
    }

    /// Story: a namespace relabelled away from a selector still triggers the
    /// replica that holds a copy there, so the stale copy can be pruned
    #[test]
    fn story_relabelled_namespace_triggers_previous_owner() {
        let mut reporting = (*replica("infra", &[("team", "infra")])).clone();
        reporting.status = Some(ConfigMapReplicaStatus {
            config_map_statuses: vec![ConfigMapReplicaCopy {
                name: "infra".to_string(),
                namespace: "ops".to_string(),
                ready: true,
                ..Default::default()
            }],
        });
        let replicas = vec![Arc::new(reporting), replica("other", &[("team", "infra")])];

        let affected =
            replicas_for_namespace(&replicas, &namespace("ops", &[("team", "frontend")]));
        assert_eq!(names(affected), vec!["infra"]);
    }

    #[test]
    fn copy_change_maps_to_controlling_replica() {
        let owner = replica("replica", &[]);
        let mut cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("replica".to_string()),
                namespace: Some("ops".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        TypeScheme::replicator()
            .set_controller_reference(owner.as_ref(), &mut cm)
            .unwrap();

        let refs = replicas_owning(&cm);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "replica");
        assert!(refs[0].namespace.is_none());
    }

    #[test]
    fn config_map_without_owners_triggers_nothing() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("replica".to_string()),
                namespace: Some("ops".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(replicas_owning(&cm).is_empty());
    }

    #[test]
    fn unrelated_owner_references_are_ignored() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("replica".to_string()),
                namespace: Some("ops".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "Deployment".to_string(),
                    name: "web".to_string(),
                    uid: "uid-web".to_string(),
                    controller: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(replicas_owning(&cm).is_empty());
    }
}
