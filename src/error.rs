//! Error types for the secret annotator
//!
//! Errors carry enough context (secret identity, probe, failing collaborator)
//! to be logged once by the error policy and acted on by the controller scheduler.

use thiserror::Error;

use crate::cloud::ProbeKind;

/// Main error type for secret annotator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The credentials secret does not exist
    #[error("secret {namespace}/{name} not found")]
    NotFound {
        /// Namespace of the missing secret
        namespace: String,
        /// Name of the missing secret
        name: String,
    },

    /// The environment needed to probe the credentials is unavailable
    #[error("environment error [{context}]: {message}")]
    Environment {
        /// Which collaborator failed (e.g., "infrastructure", "cloud-client")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// A capability probe failed before producing an answer
    #[error("failed checking {probe} cloud creds: {message}")]
    Probe {
        /// The probe that failed
        probe: ProbeKind,
        /// Description of the underlying failure
        message: String,
    },

    /// Writing the mode annotation failed
    #[error("failed to update secret {namespace}/{name}: {message}")]
    Persistence {
        /// Namespace of the secret being written
        namespace: String,
        /// Name of the secret being written
        name: String,
        /// Description of what failed
        message: String,
        /// Whether the write lost an optimistic-concurrency race (HTTP 409)
        conflict: bool,
    },

    /// Cloud provider API error
    #[error("cloud provider error [{provider}]: {message}")]
    Cloud {
        /// Provider that returned the error (e.g., "aws")
        provider: String,
        /// Description of what failed
        message: String,
    },

    /// Invalid configuration
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a not-found error for the given secret
    pub fn not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an environment error with context
    pub fn environment(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Environment {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a probe error for the given probe
    pub fn probe(probe: ProbeKind, msg: impl Into<String>) -> Self {
        Self::Probe {
            probe,
            message: msg.into(),
        }
    }

    /// Create a persistence error for the given secret
    pub fn persistence(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Persistence {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
            conflict: false,
        }
    }

    /// Create a persistence error from a failed Kubernetes write
    ///
    /// A 409 response is recorded as a conflict so callers can tell a lost
    /// resourceVersion race from a transport failure.
    pub fn persistence_from_kube(
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: &kube::Error,
    ) -> Self {
        let conflict = matches!(source, kube::Error::Api(ae) if ae.code == 409);
        Self::Persistence {
            namespace: namespace.into(),
            name: name.into(),
            message: source.to_string(),
            conflict,
        }
    }

    /// Create a cloud provider error
    pub fn cloud(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cloud {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this error means the credentials secret is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error is retryable
    ///
    /// Retrying cannot fix a missing secret or bad configuration; those wait for
    /// a change instead. Everything else is transient from the controller's view.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { .. } => true,
            Error::NotFound { .. } => false,
            Error::Environment { .. } => true,
            Error::Probe { .. } => true,
            Error::Persistence { .. } => true,
            Error::Cloud { .. } => true,
            Error::Validation(_) => false,
        }
    }
}
