//! Selector resolution
//!
//! Maps a ConfigMapReplica's namespace selector to the concrete namespaces
//! that should receive a copy. Selectors are conjunctive exact matches: a
//! namespace matches when its labels contain every selector pair. An empty
//! selector matches every namespace.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::debug;

use crate::store::ReplicaStore;
use crate::Error;

/// Render a selector as a Kubernetes label selector string (`k1=v1,k2=v2`)
pub fn render_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` contains every pair in `selector`
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

/// Resolve `selector` to the names of the namespaces that currently match.
///
/// Pure read. Results keep the store's order, which is not guaranteed to be
/// stable across calls. Any failure is reported as [`Error::ScopeList`]; a
/// partial list is never returned.
pub async fn resolve(
    store: &dyn ReplicaStore,
    selector: &BTreeMap<String, String>,
) -> Result<Vec<String>, Error> {
    let namespaces = store
        .list_namespaces(selector)
        .await
        .map_err(|e| match e {
            Error::ScopeList { .. } => e,
            other => Error::scope_list(render_selector(selector), other.to_string()),
        })?;

    // Re-check locally: the label filter is applied by the store, but a copy
    // in a non-matching namespace would violate the replica's contract.
    let names: Vec<String> = namespaces
        .iter()
        .filter(|ns| selector_matches(selector, ns.metadata.labels.as_ref()))
        .map(|ns| ns.name_any())
        .collect();

    debug!(
        selector = %render_selector(selector),
        matched = names.len(),
        "resolved namespaces"
    );
    Ok(names)
}
