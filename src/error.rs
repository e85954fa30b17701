//! Error types for the replicator controller
//!
//! Errors carry enough context (kind, name, namespace) to be useful in logs
//! and in the per-copy status report. Each variant maps to a CamelCase
//! `reason` that is written into `ConfigMapReplicaCopy.reason` when a single
//! namespace fails.

use thiserror::Error;

/// Main error type for replicator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error that did not map to a more specific variant
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Object does not exist in the store
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Namespaced or cluster-scoped name of the missing object
        name: String,
    },

    /// Optimistic-concurrency failure: the object changed since it was read
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Kind of the conflicting object
        kind: String,
        /// Name of the conflicting object
        name: String,
        /// Detail from the store
        message: String,
    },

    /// Create failed because the object already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Kind of the existing object
        kind: String,
        /// Name of the existing object
        name: String,
    },

    /// Listing candidate namespaces failed
    #[error("failed to list namespaces for selector '{selector}': {message}")]
    ScopeList {
        /// Rendered label selector
        selector: String,
        /// Description of what failed
        message: String,
    },

    /// Owner reference could not be set on a dependent
    #[error("owner reference error for {kind}: {message}")]
    OwnerLink {
        /// Kind of the dependent or owner that failed
        kind: String,
        /// Description of what failed
        message: String,
    },

    /// Generic store failure (used by non-Kubernetes stores)
    #[error("store error [{operation}]: {message}")]
    Store {
        /// Store operation that failed (get, create, update, ...)
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a namespace listing error
    pub fn scope_list(selector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ScopeList {
            selector: selector.into(),
            message: msg.into(),
        }
    }

    /// Create an owner reference error
    pub fn owner_link(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::OwnerLink {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a generic store error
    pub fn store(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Classify a kube-rs error returned while operating on `kind`/`name`.
    ///
    /// 404 becomes [`Error::NotFound`] and 409 becomes [`Error::AlreadyExists`]
    /// (on create) or [`Error::Conflict`] (everything else).
    pub fn from_kube(err: kube::Error, kind: &str, name: &str, creating: bool) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 && creating => Self::already_exists(kind, name),
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(kind, name, ae.message),
            other => Self::Kube { source: other },
        }
    }

    /// Whether a failed pass should be requeued.
    ///
    /// Owner-link and serialization failures indicate a configuration or
    /// programming defect that will not go away on its own.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::OwnerLink { .. } | Self::Serialization { .. })
    }

    /// Whether this is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// CamelCase reason recorded in copy status
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Kube { .. } => "KubernetesError",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::ScopeList { .. } => "NamespaceListFailed",
            Self::OwnerLink { .. } => "OwnerReferenceFailed",
            Self::Store { .. } => "StoreError",
            Self::Serialization { .. } => "SerializationError",
            Self::Internal { .. } => "InternalError",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
