//! Custom Resource Definitions for the replicator
//!
//! This module contains the ConfigMapReplica CRD and its supporting types.

mod replica;
mod types;

pub use replica::{ConfigMapReplica, ConfigMapReplicaSpec, ConfigMapReplicaStatus};
pub use types::{ConfigMapReplicaCopy, ConfigMapTemplate};
