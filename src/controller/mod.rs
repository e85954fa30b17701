//! Controller implementation for ConfigMapReplica
//!
//! Follows the Kubernetes controller pattern: observe the desired replica and
//! the copies that exist, apply the difference, report per-copy status.

mod replica;
mod status;

pub use replica::{
    desired_config_map, error_policy, matches_template, reconcile, reconcile_by_name, Context,
    ContextBuilder, PassOutcome,
};
pub use status::{CopyOutcome, StatusBook};
