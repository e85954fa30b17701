//! Kubernetes Event recording for the replication controller.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so copy lifecycle changes show up in `kubectl describe configmapreplica`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Trait for publishing Kubernetes Events.
///
/// Implementations log a warning on failure but never return an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - machine-readable reason, one of [`reasons`]
    /// * `action` - what was attempted, one of [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// A copy was created in a matching namespace
    pub const COPY_CREATED: &str = "CopyCreated";
    /// A drifted copy was brought back to the template
    pub const COPY_UPDATED: &str = "CopyUpdated";
    /// A copy in a namespace that stopped matching was deleted
    pub const COPY_PRUNED: &str = "CopyPruned";
    /// Creating, updating, reading or pruning a copy failed
    pub const COPY_FAILED: &str = "CopyFailed";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Creating or updating a copy
    pub const APPLY: &str = "Apply";
    /// Deleting a stale copy
    pub const PRUNE: &str = "Prune";
}
