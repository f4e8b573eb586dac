//! Shared fixtures for kind tests

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use secret_annotator::cloud::{CapabilityProbe, CloudClientBuilder, ProbeKind};
use secret_annotator::controller::Context;
use secret_annotator::credentials::{
    AwsCredentials, AWS_ACCESS_KEY_ID_FIELD, AWS_SECRET_ACCESS_KEY_FIELD,
};
use secret_annotator::events::NoopEventPublisher;
use secret_annotator::infrastructure::StaticInfraName;
use secret_annotator::Error;

/// Namespace the test secrets live in
pub const TEST_NAMESPACE: &str = "default";

static CRYPTO: Once = Once::new();

/// Connect to the cluster in the current kubeconfig context
pub async fn ensure_test_cluster() -> Result<Client, String> {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
    Client::try_default()
        .await
        .map_err(|e| format!("failed to connect to cluster: {}", e))
}

/// What a fixed probe answers
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Allowed,
    Denied,
    Unreachable,
}

impl Answer {
    fn result(self, probe: ProbeKind) -> Result<bool, Error> {
        match self {
            Answer::Allowed => Ok(true),
            Answer::Denied => Ok(false),
            Answer::Unreachable => Err(Error::probe(probe, "endpoint unreachable")),
        }
    }
}

/// Cloud stand-in answering every probe from a fixed table
#[derive(Debug, Clone, Copy)]
pub struct FixedCloud {
    pub mint: Answer,
    pub passthrough: Answer,
}

struct FixedProbe(FixedCloud);

#[async_trait]
impl CapabilityProbe for FixedProbe {
    async fn can_mint(&self) -> Result<bool, Error> {
        self.0.mint.result(ProbeKind::Mint)
    }

    async fn can_passthrough(&self) -> Result<bool, Error> {
        self.0.passthrough.result(ProbeKind::Passthrough)
    }
}

#[async_trait]
impl CloudClientBuilder for FixedCloud {
    async fn build(
        &self,
        _credentials: &AwsCredentials,
        _infra_name: &str,
    ) -> Result<Box<dyn CapabilityProbe>, Error> {
        Ok(Box::new(FixedProbe(*self)))
    }
}

/// Controller context talking to the real cluster with a fixed cloud
pub fn test_context(client: Client, cloud: FixedCloud) -> Context {
    Context::builder(client)
        .infra_resolver(Arc::new(StaticInfraName::new("kind-test")))
        .cloud_builder(Arc::new(cloud))
        .event_publisher(Arc::new(NoopEventPublisher))
        .build()
}

/// Build a credentials secret, optionally leaving out the secret key
pub fn creds_secret(name: &str, with_secret_key: bool) -> Secret {
    let mut data = BTreeMap::from([(
        AWS_ACCESS_KEY_ID_FIELD.to_string(),
        ByteString(b"AKIDEXAMPLE".to_vec()),
    )]);
    if with_secret_key {
        data.insert(
            AWS_SECRET_ACCESS_KEY_FIELD.to_string(),
            ByteString(b"wJalrXUtnFEMI".to_vec()),
        );
    }
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Replace any leftover secret from a previous run with `secret`
pub async fn recreate_secret(client: &Client, secret: &Secret) {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = secret.metadata.name.clone().unwrap_or_default();
    delete_secret(client, &name).await;
    api.create(&PostParams::default(), secret)
        .await
        .expect("failed to create secret");
}

/// Delete a test secret, ignoring errors
pub async fn delete_secret(client: &Client, name: &str) {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Read back the mode annotation from the cluster
pub async fn persisted_mode(client: &Client, name: &str) -> Option<String> {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let secret = api.get(name).await.expect("failed to read secret");
    secret
        .metadata
        .annotations
        .and_then(|a| a.get(secret_annotator::mode::MODE_ANNOTATION).cloned())
}
