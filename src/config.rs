//! Controller configuration
//!
//! Settings come from the command line (or the matching environment
//! variables) and are collected into a [`ControllerConfig`] that travels with
//! the controller context.

use std::time::Duration;

use clap::Args;

use crate::retry::RetryConfig;
use crate::telemetry::LogFormat;

/// Field manager recorded on every write made by the controller
pub const DEFAULT_FIELD_MANAGER: &str = "replicator";

/// Default delay before a pass with failed copies is retried
pub const DEFAULT_FAILURE_REQUEUE_SECS: u64 = 30;

/// Default number of attempts for a pass whose status write conflicts
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Runtime settings for the replication controller
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Field manager used for writes
    pub field_manager: String,
    /// Requeue delay after a pass that left some copies not ready
    pub failure_requeue: Duration,
    /// Delete copies in namespaces that stopped matching the selector
    pub prune: bool,
    /// Backoff for re-running a pass after a status write conflict
    pub conflict_retry: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            failure_requeue: Duration::from_secs(DEFAULT_FAILURE_REQUEUE_SECS),
            prune: true,
            conflict_retry: conflict_retry(DEFAULT_CONFLICT_RETRIES),
        }
    }
}

fn conflict_retry(attempts: u32) -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(2),
        ..RetryConfig::with_max_attempts(attempts.max(1))
    }
}

/// Command line arguments for `replicator controller`
#[derive(Args, Clone, Debug)]
pub struct ControllerArgs {
    /// Field manager recorded on writes
    #[arg(long, env = "REPLICATOR_FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    pub field_manager: String,

    /// Seconds to wait before retrying a replica with failed copies
    #[arg(long, env = "REPLICATOR_FAILURE_REQUEUE_SECS", default_value_t = DEFAULT_FAILURE_REQUEUE_SECS)]
    pub failure_requeue_secs: u64,

    /// Delete copies left in namespaces that no longer match
    #[arg(
        long,
        env = "REPLICATOR_PRUNE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub prune: bool,

    /// Attempts per pass when the status write conflicts
    #[arg(long, env = "REPLICATOR_CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    pub conflict_retries: u32,

    /// Log output format
    #[arg(long, env = "REPLICATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ControllerArgs {
    /// Build the controller configuration from parsed arguments
    pub fn to_config(&self) -> ControllerConfig {
        ControllerConfig {
            field_manager: self.field_manager.clone(),
            failure_requeue: Duration::from_secs(self.failure_requeue_secs),
            prune: self.prune,
            conflict_retry: conflict_retry(self.conflict_retries),
        }
    }
}
