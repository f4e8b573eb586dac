//! Capability mode persisted on the credentials secret

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Secret;
use serde::{Deserialize, Serialize};

/// Annotation key holding the capability mode
pub const MODE_ANNOTATION: &str = "cloudcredential.openshift.io/mode";

/// What the cloud credentials may be used for
///
/// Modes form a trust hierarchy: mint ⊃ passthrough ⊃ insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityMode {
    /// The credentials can create new scoped credentials
    Mint,
    /// The credentials are good enough to be reused as-is
    Passthrough,
    /// The credentials are not usable for cluster operation
    Insufficient,
}

impl CapabilityMode {
    /// The literal annotation value for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityMode::Mint => "mint",
            CapabilityMode::Passthrough => "passthrough",
            CapabilityMode::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for CapabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(CapabilityMode::Mint),
            "passthrough" => Ok(CapabilityMode::Passthrough),
            "insufficient" => Ok(CapabilityMode::Insufficient),
            other => Err(format!("unknown capability mode: {}", other)),
        }
    }
}

/// Read the mode currently persisted on a secret
///
/// Returns `None` before the first successful reconciliation, or when the
/// annotation holds a value this controller never writes.
pub fn current_mode(secret: &Secret) -> Option<CapabilityMode> {
    secret
        .metadata
        .annotations
        .as_ref()?
        .get(MODE_ANNOTATION)?
        .parse()
        .ok()
}
