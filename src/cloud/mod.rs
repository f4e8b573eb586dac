//! Cloud client construction and capability probes
//!
//! The reconciler never talks to a cloud SDK directly. It asks a
//! [`CloudClientBuilder`] for an authenticated [`CapabilityProbe`] and asks
//! that probe two independent questions. One builder exists per cloud
//! provider; tests inject mocks.

use std::fmt;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::credentials::AwsCredentials;
use crate::Error;

pub mod aws;

pub use aws::AwsClientBuilder;

/// The capability checks a probe can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Can the identity create new scoped credentials?
    Mint,
    /// Can the identity be used as-is?
    Passthrough,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Mint => f.write_str("create"),
            ProbeKind::Passthrough => f.write_str("passthrough"),
        }
    }
}

/// Authenticated cloud client answering capability questions
///
/// Each call is a live, possibly rate-limited, request to the provider.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Whether the credentials can mint new scoped credentials
    async fn can_mint(&self) -> Result<bool, Error>;

    /// Whether the credentials can be passed through to cluster components as-is
    async fn can_passthrough(&self) -> Result<bool, Error>;
}

/// Builds authenticated cloud clients from credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudClientBuilder: Send + Sync {
    /// Build a client for `credentials`, tagged with the cluster infrastructure name
    async fn build(
        &self,
        credentials: &AwsCredentials,
        infra_name: &str,
    ) -> Result<Box<dyn CapabilityProbe>, Error>;
}
