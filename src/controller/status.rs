//! Per-copy status bookkeeping for a single reconcile pass
//!
//! The engine folds one [`CopyOutcome`] per matching namespace into a
//! [`StatusBook`] seeded from the replica's last written status, then writes
//! the book back as the new `.status`.

use chrono::{DateTime, Utc};

use crate::crd::{ConfigMapReplicaCopy, ConfigMapReplicaStatus};
use crate::Error;

/// What happened to one copy during a pass
#[derive(Debug)]
pub enum CopyOutcome {
    /// The copy did not exist and was created
    Created,
    /// The copy had drifted and was rewritten
    Updated,
    /// The copy already matched the template
    Unchanged,
    /// Reading or writing the copy failed
    Failed(Error),
}

impl CopyOutcome {
    /// Whether the copy matches the template after this pass
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Whether the pass wrote the copy
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Working copy of `.status.configMapStatuses`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusBook {
    entries: Vec<ConfigMapReplicaCopy>,
}

impl StatusBook {
    /// Seed the book from the last written status
    pub fn from_status(status: Option<&ConfigMapReplicaStatus>) -> Self {
        Self {
            entries: status
                .map(|s| s.config_map_statuses.clone())
                .unwrap_or_default(),
        }
    }

    /// Fold the outcome for `name` in `namespace` into the book.
    ///
    /// The entry is created on first sight. The probe time always moves to
    /// `now`; the transition time moves when readiness flips or the copy was
    /// written.
    pub fn record(&mut self, name: &str, namespace: &str, outcome: &CopyOutcome, now: DateTime<Utc>) {
        let ready = outcome.is_ready();
        let index = match self.entries.iter().position(|e| e.is_for(name, namespace)) {
            Some(index) => index,
            None => {
                self.entries.push(ConfigMapReplicaCopy {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    ready,
                    last_transition_time: Some(now),
                    ..Default::default()
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        if entry.ready != ready || outcome.wrote() {
            entry.last_transition_time = Some(now);
        }
        entry.ready = ready;
        entry.last_probe_time = Some(now);

        match outcome {
            CopyOutcome::Failed(err) => {
                entry.reason = Some(err.reason().to_string());
                entry.message = Some(err.to_string());
            }
            _ => {
                entry.reason = None;
                entry.message = None;
            }
        }
    }

    /// Drop entries for namespaces outside `namespaces`
    pub fn retain_namespaces(&mut self, namespaces: &[String]) {
        self.entries
            .retain(|e| namespaces.iter().any(|ns| *ns == e.namespace));
    }

    /// Entries in the book
    pub fn entries(&self) -> &[ConfigMapReplicaCopy] {
        &self.entries
    }

    /// Number of entries not ready
    pub fn not_ready(&self) -> usize {
        self.entries.iter().filter(|e| !e.ready).count()
    }

    /// Finish the pass and produce the status to write
    pub fn into_status(self) -> ConfigMapReplicaStatus {
        ConfigMapReplicaStatus {
            config_map_statuses: self.entries,
        }
    }
}
