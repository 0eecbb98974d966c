//! Error types for the Mantle operator
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the resource kind, object name, or cluster it relates to,
//! and classifies itself as retryable or terminal for the controller's
//! error policy.

use thiserror::Error;

/// Main error type for Mantle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A generator failed to produce an artifact
    #[error("failed to generate {kind} {name}: {message}")]
    Generation {
        /// Resource kind being generated (e.g. "secret")
        kind: String,
        /// Object name within the cluster namespace
        name: String,
        /// Description of what failed
        message: String,
    },

    /// The host cluster rejected a create call
    #[error("failed to create {kind} {name}: {source}")]
    CreateFailed {
        /// Resource kind being created
        kind: String,
        /// Object name
        name: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// The host cluster rejected a delete call
    #[error("failed to delete {kind} {name}: {source}")]
    DeleteFailed {
        /// Resource kind being deleted
        kind: String,
        /// Object name
        name: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// A resource template could not be read or rendered
    #[error("template {path}: {message}")]
    Template {
        /// Path of the template file, relative to the resources root
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Certificate or key material could not be produced
    #[error("pki error: {message}")]
    Pki {
        /// Description of what failed
        message: String,
    },

    /// The cluster requests a master version the registry does not know
    #[error("unknown new cluster {cluster:?} master version {version:?}")]
    UnknownMasterVersion {
        /// Name of the cluster
        cluster: String,
        /// The unresolvable version id
        version: String,
    },

    /// Every NodePort in the configured range is taken
    #[error("no free NodePort available within the given range {min}-{max}")]
    PortsExhausted {
        /// Lower bound of the range (inclusive)
        min: i32,
        /// Upper bound of the range (inclusive)
        max: i32,
    },

    /// The cluster exceeded the time allowed in its current phase
    #[error("cluster {cluster} timed out in phase {phase}")]
    Timeout {
        /// Name of the cluster
        cluster: String,
        /// Phase the cluster was stuck in
        phase: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error: {message}")]
    Internal {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a generation error for the given kind and object name
    pub fn generation(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Generation {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a template error for the given file
    pub fn template(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Template {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a PKI error with the given message
    pub fn pki(msg: impl Into<String>) -> Self {
        Self::Pki {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Cache/API errors (including "already exists" races against a stale
    /// cache) clear on the next reconcile once the informer catches up.
    /// Template, PKI and version errors require operator intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Don't retry 4xx responses other than conflicts; those need
                // a spec or config change. 409 clears once the cache warms.
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
                )
            }
            Error::CreateFailed { .. } | Error::DeleteFailed { .. } => true,
            Error::PortsExhausted { .. } => true,
            Error::Timeout { .. } => false,
            Error::Generation { .. } => false,
            Error::Template { .. } => false,
            Error::Pki { .. } => false,
            Error::UnknownMasterVersion { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
