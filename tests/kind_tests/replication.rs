//! Stories about replicating ConfigMaps through a real API server
//!
//! The controller loop is not started; each test drives passes directly with
//! `reconcile_by_name` so the outcome of every step can be asserted.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};

use replicator::config::ControllerConfig;
use replicator::controller::{reconcile_by_name, Context, PassOutcome};
use replicator::crd::{ConfigMapReplica, ConfigMapReplicaSpec, ConfigMapTemplate};

use super::helpers::{apply_namespace, delete_namespace, delete_replica, ensure_test_cluster};

fn sample_replica(name: &str, team: &str) -> ConfigMapReplica {
    ConfigMapReplica::new(
        name,
        ConfigMapReplicaSpec {
            template: ConfigMapTemplate {
                labels: BTreeMap::from([("app".to_string(), name.to_string())]),
                data: BTreeMap::from([("file.yaml".to_string(), "v1".to_string())]),
            },
            selector: BTreeMap::from([("team".to_string(), team.to_string())]),
        },
    )
}

fn context(client: &Client) -> Context {
    Context::from_client(client.clone(), ControllerConfig::default())
}

/// Story: platform operator shares a config file with every infra namespace
///
/// Expected behavior:
/// - A ConfigMap named after the replica appears in the labelled namespace
/// - It is owned by the replica so deleting the replica cleans it up
/// - The replica's status reports the copy as ready
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_replicates_config_to_labelled_namespace() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-replicate";
    let team = "kind-replicate-team";
    apply_namespace(&client, "kind-replicate-ops", &[("team", team)])
        .await
        .expect("namespace");
    apply_namespace(&client, "kind-replicate-web", &[("team", "other")])
        .await
        .expect("namespace");

    let replicas: Api<ConfigMapReplica> = Api::all(client.clone());
    replicas
        .create(&PostParams::default(), &sample_replica(name, team))
        .await
        .expect("create replica");

    let outcome = reconcile_by_name(name, &context(&client))
        .await
        .expect("pass should succeed");
    assert_eq!(outcome, PassOutcome::Converged { copies: 1 });

    let copies: Api<ConfigMap> = Api::namespaced(client.clone(), "kind-replicate-ops");
    let copy = copies.get(name).await.expect("copy exists");
    assert_eq!(
        copy.data.as_ref().and_then(|d| d.get("file.yaml")).map(String::as_str),
        Some("v1")
    );
    let owner = &copy.owner_references()[0];
    assert_eq!(owner.kind, "ConfigMapReplica");
    assert_eq!(owner.block_owner_deletion, Some(true));

    let others: Api<ConfigMap> = Api::namespaced(client.clone(), "kind-replicate-web");
    assert!(others.get_opt(name).await.expect("get").is_none());

    let status = replicas
        .get_status(name)
        .await
        .expect("get status")
        .status
        .expect("status written");
    assert!(status.is_converged(1));

    delete_replica(&client, name).await;
    delete_namespace(&client, "kind-replicate-ops").await;
    delete_namespace(&client, "kind-replicate-web").await;
}

/// Story: someone edits a copy by hand and the controller puts it back
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_manual_edit_is_reverted() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-drift";
    let team = "kind-drift-team";
    apply_namespace(&client, "kind-drift-ops", &[("team", team)])
        .await
        .expect("namespace");

    let replicas: Api<ConfigMapReplica> = Api::all(client.clone());
    replicas
        .create(&PostParams::default(), &sample_replica(name, team))
        .await
        .expect("create replica");
    let ctx = context(&client);
    reconcile_by_name(name, &ctx).await.expect("first pass");

    let copies: Api<ConfigMap> = Api::namespaced(client.clone(), "kind-drift-ops");
    let mut copy = copies.get(name).await.expect("copy exists");
    copy.data = Some(BTreeMap::from([(
        "file.yaml".to_string(),
        "tampered".to_string(),
    )]));
    copies
        .replace(name, &PostParams::default(), &copy)
        .await
        .expect("manual edit");

    reconcile_by_name(name, &ctx).await.expect("second pass");

    let restored = copies.get(name).await.expect("copy exists");
    assert_eq!(
        restored.data.as_ref().and_then(|d| d.get("file.yaml")).map(String::as_str),
        Some("v1")
    );

    delete_replica(&client, name).await;
    delete_namespace(&client, "kind-drift-ops").await;
}

/// Story: a namespace is relabelled away from the selector and its copy is
/// pruned on the next pass
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_relabelled_namespace_loses_copy() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-prune";
    let team = "kind-prune-team";
    apply_namespace(&client, "kind-prune-dev", &[("team", team)])
        .await
        .expect("namespace");

    let replicas: Api<ConfigMapReplica> = Api::all(client.clone());
    replicas
        .create(&PostParams::default(), &sample_replica(name, team))
        .await
        .expect("create replica");
    let ctx = context(&client);
    reconcile_by_name(name, &ctx).await.expect("first pass");

    apply_namespace(&client, "kind-prune-dev", &[("team", "elsewhere")])
        .await
        .expect("relabel");
    let outcome = reconcile_by_name(name, &ctx).await.expect("second pass");
    assert_eq!(outcome, PassOutcome::Converged { copies: 0 });

    let copies: Api<ConfigMap> = Api::namespaced(client.clone(), "kind-prune-dev");
    assert!(copies.get_opt(name).await.expect("get").is_none());

    delete_replica(&client, name).await;
    delete_namespace(&client, "kind-prune-dev").await;
}
