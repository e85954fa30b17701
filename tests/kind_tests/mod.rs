//! Integration tests for the replicator controller
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! platform operators use ConfigMapReplicas in a real cluster.
//!
//! - `replication`: creating replicas, labelling namespaces, drift repair and
//!   status reporting through the Kubernetes API
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod replication;
