//! Cloud provider credentials
//!
//! Extraction of the AWS key pair from the credentials secret.

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret data key holding the AWS access key ID
pub const AWS_ACCESS_KEY_ID_FIELD: &str = "aws_access_key_id";

/// Secret data key holding the AWS secret access key
pub const AWS_SECRET_ACCESS_KEY_FIELD: &str = "aws_secret_access_key";

/// A required credential field is absent from the secret
///
/// This is a classification input, not an error: credentials that cannot be
/// read are insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret did not contain key {}", self.0)
    }
}

/// AWS credentials read from the cluster credentials secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AwsCredentials {
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: String,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl AwsCredentials {
    /// Create credentials from a key pair
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Load credentials from a K8s secret's data
    ///
    /// A field counts as present whenever its key exists, even with an empty
    /// value. The access key ID is checked first.
    pub fn from_secret(secret: &Secret) -> Result<Self, MissingField> {
        let data = secret.data.as_ref();
        let field = |key: &'static str| {
            data.and_then(|d| d.get(key))
                .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                .ok_or(MissingField(key))
        };

        let access_key_id = field(AWS_ACCESS_KEY_ID_FIELD)?;
        let secret_access_key = field(AWS_SECRET_ACCESS_KEY_FIELD)?;

        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}
