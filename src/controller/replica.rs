//! ConfigMapReplica controller implementation
//!
//! One pass reads the replica, resolves its selector, applies the template to
//! a ConfigMap in every matching namespace, optionally prunes copies left in
//! namespaces that no longer match, and writes a per-namespace status report.
//!
//! A failure in one namespace is recorded in that namespace's status entry and
//! never stops the others. Failures that invalidate the whole pass (the
//! replica read, namespace listing, owner linking, the status write) abort it
//! and are handed to [`error_policy`]. A status write that loses an
//! optimistic-concurrency race re-runs the whole pass from a fresh read.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::status::{CopyOutcome, StatusBook};
use crate::config::ControllerConfig;
use crate::crd::ConfigMapReplica;
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher, NoopEventPublisher};
use crate::owner::{is_controlled_by, TypeScheme};
use crate::resolver;
use crate::retry::retry_with_backoff_if;
use crate::store::{KubeStore, ReplicaStore};
use crate::Error;

/// Controller context shared across reconcile calls
///
/// ```ignore
/// let ctx = Context::builder(Arc::new(KubeStore::new(client.clone(), "replicator")))
///     .events(Arc::new(KubeEventPublisher::new(client, "replicator")))
///     .config(config)
///     .build();
/// ```
pub struct Context {
    /// Object store (trait object for testability)
    pub store: Arc<dyn ReplicaStore>,
    /// Event sink for copy lifecycle events
    pub events: Arc<dyn EventPublisher>,
    /// Kinds allowed in owner references
    pub scheme: TypeScheme,
    /// Runtime settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder around `store`
    pub fn builder(store: Arc<dyn ReplicaStore>) -> ContextBuilder {
        ContextBuilder::new(store)
    }

    /// Production context: Kubernetes-backed store and event recorder
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        let store = Arc::new(KubeStore::new(client.clone(), config.field_manager.clone()));
        let events = Arc::new(KubeEventPublisher::new(client, &config.field_manager));
        Self::builder(store).events(events).config(config).build()
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    store: Arc<dyn ReplicaStore>,
    events: Option<Arc<dyn EventPublisher>>,
    scheme: Option<TypeScheme>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(store: Arc<dyn ReplicaStore>) -> Self {
        Self {
            store,
            events: None,
            scheme: None,
            config: ControllerConfig::default(),
        }
    }

    /// Set the event publisher (defaults to dropping events)
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the type scheme (defaults to [`TypeScheme::replicator`])
    pub fn scheme(mut self, scheme: TypeScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Set runtime settings
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            store: self.store,
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventPublisher)),
            scheme: self.scheme.unwrap_or_else(TypeScheme::replicator),
            config: self.config,
        }
    }
}

/// Result of one completed pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The replica no longer exists; nothing was done
    Deleted,
    /// Every matching namespace holds a ready copy
    Converged {
        /// Number of matching namespaces
        copies: usize,
    },
    /// Some copies (or prunes) failed and were recorded in status
    Degraded {
        /// Number of matching namespaces
        copies: usize,
        /// Copies not ready plus failed prunes
        failed: usize,
    },
}

impl PassOutcome {
    /// Requeue decision for this outcome
    pub fn action(&self, config: &ControllerConfig) -> Action {
        match self {
            Self::Deleted | Self::Converged { .. } => Action::await_change(),
            Self::Degraded { .. } => Action::requeue(config.failure_requeue),
        }
    }
}

/// Reconcile a ConfigMapReplica resource
///
/// The cached object only supplies the name: every pass re-reads the replica
/// from the store so it works on the latest spec and resourceVersion.
#[instrument(skip(replica, ctx), fields(replica = %replica.name_any()))]
pub async fn reconcile(replica: Arc<ConfigMapReplica>, ctx: Arc<Context>) -> Result<Action, Error> {
    let outcome = reconcile_by_name(&replica.name_any(), &ctx).await?;
    Ok(outcome.action(&ctx.config))
}

/// Run passes for `name` until one completes without a status write conflict,
/// or the configured attempts run out
pub async fn reconcile_by_name(name: &str, ctx: &Context) -> Result<PassOutcome, Error> {
    retry_with_backoff_if(
        &ctx.config.conflict_retry,
        "reconcile_pass",
        Error::is_conflict,
        || run_pass(name, ctx),
    )
    .await
}

async fn run_pass(name: &str, ctx: &Context) -> Result<PassOutcome, Error> {
    let Some(replica) = ctx.store.get_replica(name).await? else {
        debug!("replica no longer exists");
        return Ok(PassOutcome::Deleted);
    };
    info!("reconciling replica");

    let namespaces = resolver::resolve(ctx.store.as_ref(), &replica.spec.selector).await?;

    let mut desired = desired_config_map(&replica);
    ctx.scheme.set_controller_reference(&replica, &mut desired)?;
    let uid = replica
        .uid()
        .ok_or_else(|| Error::owner_link(ConfigMapReplica::kind(&()), "owner has no uid"))?;

    let reference = replica.object_ref(&());
    let mut book = StatusBook::from_status(replica.status.as_ref());

    for namespace in &namespaces {
        let outcome = apply_copy(ctx, &replica, &uid, &desired, namespace).await;
        report(ctx, &reference, namespace, &outcome).await;
        book.record(name, namespace, &outcome, Utc::now());
    }
    book.retain_namespaces(&namespaces);

    let failed_prunes = if ctx.config.prune {
        prune_stale_copies(ctx, name, &uid, &reference, &namespaces).await
    } else {
        0
    };

    let failed = book.not_ready() + failed_prunes;
    let mut updated = replica;
    updated.status = Some(book.into_status());
    ctx.store.update_replica_status(&updated).await?;

    let copies = namespaces.len();
    if failed == 0 {
        info!(copies, "replica converged");
        Ok(PassOutcome::Converged { copies })
    } else {
        warn!(copies, failed, "replica has failed copies");
        Ok(PassOutcome::Degraded { copies, failed })
    }
}

/// Canonical ConfigMap for `replica`: same name, template labels and data.
/// The namespace is filled in per copy.
pub fn desired_config_map(replica: &ConfigMapReplica) -> ConfigMap {
    let template = &replica.spec.template;
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(replica.name_any()),
            labels: non_empty(&template.labels),
            ..Default::default()
        },
        data: non_empty(&template.data),
        ..Default::default()
    }
}

fn non_empty(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}

/// Whether `current` carries exactly the labels and data of `desired`.
/// A missing map and an empty one are the same.
pub fn matches_template(current: &ConfigMap, desired: &ConfigMap) -> bool {
    let empty = BTreeMap::new();
    let labels = |cm: &ConfigMap| cm.metadata.labels.as_ref().unwrap_or(&empty).clone();
    let data = |cm: &ConfigMap| cm.data.as_ref().unwrap_or(&empty).clone();
    labels(current) == labels(desired) && data(current) == data(desired)
}

/// Bring the ConfigMap in `namespace` in line with `desired`.
///
/// An existing ConfigMap without a controller is adopted. One controlled by
/// anything other than `replica` is left untouched and reported as failed.
async fn apply_copy(
    ctx: &Context,
    replica: &ConfigMapReplica,
    uid: &str,
    desired: &ConfigMap,
    namespace: &str,
) -> CopyOutcome {
    let name = desired.name_any();
    let existing = match ctx.store.get_config_map(namespace, &name).await {
        Ok(existing) => existing,
        Err(e) => return CopyOutcome::Failed(e),
    };

    match existing {
        None => {
            let mut copy = desired.clone();
            copy.metadata.namespace = Some(namespace.to_string());
            match ctx.store.create_config_map(&copy).await {
                Ok(_) => CopyOutcome::Created,
                Err(e) => CopyOutcome::Failed(e),
            }
        }
        Some(current)
            if is_controlled_by(current.metadata.owner_references.as_deref(), uid)
                && matches_template(&current, desired) =>
        {
            CopyOutcome::Unchanged
        }
        Some(mut current) => {
            if let Err(e) = ctx.scheme.set_controller_reference(replica, &mut current) {
                return CopyOutcome::Failed(e);
            }
            // Keep the stored metadata (resourceVersion, annotations, other
            // owner references) and only replace what the template controls.
            current.metadata.labels = desired.metadata.labels.clone();
            current.data = desired.data.clone();
            match ctx.store.update_config_map(&current).await {
                Ok(_) => CopyOutcome::Updated,
                Err(e) => CopyOutcome::Failed(e),
            }
        }
    }
}

async fn report(ctx: &Context, reference: &ObjectReference, namespace: &str, outcome: &CopyOutcome) {
    let (type_, reason, note) = match outcome {
        CopyOutcome::Unchanged => return,
        CopyOutcome::Created => (
            EventType::Normal,
            reasons::COPY_CREATED,
            format!("created copy in namespace {namespace}"),
        ),
        CopyOutcome::Updated => (
            EventType::Normal,
            reasons::COPY_UPDATED,
            format!("restored drifted copy in namespace {namespace}"),
        ),
        CopyOutcome::Failed(e) => {
            warn!(namespace, error = %e, "failed to apply copy");
            (
                EventType::Warning,
                reasons::COPY_FAILED,
                format!("namespace {namespace}: {e}"),
            )
        }
    };
    ctx.events
        .publish(reference, type_, reason, actions::APPLY, Some(note))
        .await;
}

/// Delete copies named `name` and controlled by `uid` in namespaces outside
/// `namespaces`. Returns the number of failures; failures are logged and never
/// abort the pass.
async fn prune_stale_copies(
    ctx: &Context,
    name: &str,
    uid: &str,
    reference: &ObjectReference,
    namespaces: &[String],
) -> usize {
    let candidates = match ctx.store.list_config_maps_named(name).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "failed to list copies for pruning");
            return 1;
        }
    };

    let mut failed = 0;
    for stale in candidates.iter().filter(|cm| {
        let in_scope = cm
            .namespace()
            .is_some_and(|ns| namespaces.iter().any(|n| *n == ns));
        !in_scope && is_controlled_by(cm.metadata.owner_references.as_deref(), uid)
    }) {
        let namespace = stale.namespace().unwrap_or_default();
        match ctx.store.delete_config_map(&namespace, name).await {
            Ok(()) => {
                info!(namespace = %namespace, "pruned copy");
                ctx.events
                    .publish(
                        reference,
                        EventType::Normal,
                        reasons::COPY_PRUNED,
                        actions::PRUNE,
                        Some(format!("deleted copy in namespace {namespace}")),
                    )
                    .await;
            }
            // Already gone: the end state is what pruning wanted
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "failed to prune copy");
                ctx.events
                    .publish(
                        reference,
                        EventType::Warning,
                        reasons::COPY_FAILED,
                        actions::PRUNE,
                        Some(format!("namespace {namespace}: {e}")),
                    )
                    .await;
                failed += 1;
            }
        }
    }
    failed
}

/// Error policy for the controller
///
/// Retryable failures are requeued after the configured delay. Failures that
/// need a human (an unregistered kind, a copy controlled by someone else) wait
/// for the replica to change.
pub fn error_policy(replica: Arc<ConfigMapReplica>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(
            %error,
            replica = %replica.name_any(),
            "reconciliation failed, requeueing"
        );
        Action::requeue(ctx.config.failure_requeue)
    } else {
        error!(
            ?error,
            replica = %replica.name_any(),
            "reconciliation failed permanently"
        );
        Action::await_change()
    }
}
