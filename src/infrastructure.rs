//! Cluster infrastructure name lookup
//!
//! The infrastructure name identifies this cluster to the cloud provider and
//! parametrizes cloud client construction. On OpenShift it lives in the
//! status of the cluster-scoped `Infrastructure` config object named `cluster`.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, error};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Name of the cluster-wide Infrastructure config object
pub const INFRASTRUCTURE_CONFIG_NAME: &str = "cluster";

const INFRASTRUCTURE_GROUP: &str = "config.openshift.io";
const INFRASTRUCTURE_VERSION: &str = "v1";
const INFRASTRUCTURE_KIND: &str = "Infrastructure";

/// Resolves the cluster infrastructure name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InfraNameResolver: Send + Sync {
    /// Look up the infrastructure name
    ///
    /// Failures are environment errors: the lookup says nothing about the
    /// credentials themselves.
    async fn infra_name(&self) -> Result<String, Error>;
}

/// Reads `status.infrastructureName` from the `Infrastructure` config object
pub struct InfrastructureConfigResolver {
    client: Client,
}

impl InfrastructureConfigResolver {
    /// Create a resolver using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_resource() -> ApiResource {
        let gvk = GroupVersionKind::gvk(
            INFRASTRUCTURE_GROUP,
            INFRASTRUCTURE_VERSION,
            INFRASTRUCTURE_KIND,
        );
        ApiResource::from_gvk(&gvk)
    }
}

#[async_trait]
impl InfraNameResolver for InfrastructureConfigResolver {
    async fn infra_name(&self) -> Result<String, Error> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &Self::api_resource());

        let infra = match api.get(INFRASTRUCTURE_CONFIG_NAME).await {
            Ok(obj) => obj,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                error!("Infrastructure config 'cluster' not found");
                return Err(Error::environment(
                    "infrastructure",
                    "Infrastructure config 'cluster' not found",
                ));
            }
            Err(e) => {
                error!(error = %e, "error loading Infrastructure config 'cluster'");
                return Err(Error::environment(
                    "infrastructure",
                    format!("error loading Infrastructure config 'cluster': {}", e),
                ));
            }
        };

        let name = infrastructure_name(&infra.data)?;
        debug!(infra_name = %name, "Loaded infrastructure name");
        Ok(name)
    }
}

/// Extract the infrastructure name from an `Infrastructure` object body
fn infrastructure_name(data: &serde_json::Value) -> Result<String, Error> {
    data.pointer("/status/infrastructureName")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            Error::environment(
                "infrastructure",
                "Infrastructure config 'cluster' has no status.infrastructureName",
            )
        })
}

/// Returns a fixed infrastructure name (for clusters without the config API)
pub struct StaticInfraName {
    name: String,
}

impl StaticInfraName {
    /// Create a resolver that always returns `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl InfraNameResolver for StaticInfraName {
    async fn infra_name(&self) -> Result<String, Error> {
        Ok(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_name_from_status() {
        let data = serde_json::json!({
            "spec": {},
            "status": { "infrastructureName": "prod-7x2kq", "platform": "AWS" }
        });
        assert_eq!(infrastructure_name(&data).unwrap(), "prod-7x2kq");
    }

    #[test]
    fn test_missing_status_is_environment_error() {
        let data = serde_json::json!({ "spec": {} });
        let err = infrastructure_name(&data).unwrap_err();
        assert!(matches!(err, Error::Environment { .. }));
    }

    #[test]
    fn test_empty_name_is_environment_error() {
        let data = serde_json::json!({ "status": { "infrastructureName": "" } });
        assert!(infrastructure_name(&data).is_err());
    }

    #[test]
    fn test_api_resource_plural() {
        let ar = InfrastructureConfigResolver::api_resource();
        assert_eq!(ar.group, "config.openshift.io");
        assert_eq!(ar.plural, "infrastructures");
        assert_eq!(ar.api_version, "config.openshift.io/v1");
    }

    #[tokio::test]
    async fn test_static_infra_name() {
        let resolver = StaticInfraName::new("dev-abc12");
        assert_eq!(resolver.infra_name().await.unwrap(), "dev-abc12");
    }
}
