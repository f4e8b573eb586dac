//! Secret Annotator - records what the cluster cloud credentials can do
//!
//! The controller watches the well-known cloud credentials secret and probes the
//! cloud provider to find out whether the credentials can mint new scoped
//! credentials, can only be used as-is, or are insufficient for cluster operation.
//! The verdict is written as an annotation on the secret so downstream consumers
//! can read it without repeating the (rate-limited) cloud API probing.
//!
//! # Modules
//!
//! - [`controller`] - Event filter, reconciler and controller wiring
//! - [`cloud`] - Cloud client construction and capability probes
//! - [`credentials`] - Credential extraction from the secret
//! - [`mode`] - The persisted capability mode
//! - [`infrastructure`] - Cluster infrastructure name lookup
//! - [`events`] - Kubernetes Event publishing
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod cloud;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod mode;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of this controller, used for field managers and event reporting
pub const CONTROLLER_NAME: &str = "secretannotator";

/// Namespace of the cluster cloud credentials secret
pub const CLOUD_CRED_SECRET_NAMESPACE: &str = "kube-system";

/// Name of the cluster cloud credentials secret
pub const CLOUD_CRED_SECRET_NAME: &str = "aws-creds";
