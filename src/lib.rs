//! Replicator - CRD-driven ConfigMap replication across namespaces
//!
//! A cluster-scoped `ConfigMapReplica` names a ConfigMap template and a
//! namespace label selector. The controller keeps exactly one copy of the
//! template, named after the replica, in every matching namespace, and
//! reports per-namespace readiness in the replica's status.
//!
//! # Modules
//!
//! - [`crd`] - ConfigMapReplica custom resource and status types
//! - [`resolver`] - Selector to namespace resolution
//! - [`controller`] - Reconciliation engine and error policy
//! - [`store`] - Store trait with Kubernetes and in-memory implementations
//! - [`owner`] - Owner references and the kind registry they require
//! - [`runner`] - Watch wiring for the controller
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Controller settings and command line arguments
//! - [`telemetry`] - Tracing initialization
//! - [`retry`] - Backoff helpers
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod owner;
pub mod resolver;
pub mod retry;
pub mod runner;
pub mod store;
pub mod telemetry;

pub use error::Error;
