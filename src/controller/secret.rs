//! Cloud credentials secret controller
//!
//! Decides what the cluster cloud credentials can be used for and records the
//! verdict in the `cloudcredential.openshift.io/mode` annotation. Every run
//! starts from scratch: re-read the secret, re-resolve the infrastructure
//! name, re-probe the cloud.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::filter::ReconcileRequest;
use crate::cloud::{AwsClientBuilder, CloudClientBuilder, ProbeKind};
use crate::credentials::AwsCredentials;
use crate::events::{mode_changed_event, EventPublisher, KubeEventPublisher};
use crate::infrastructure::{InfraNameResolver, InfrastructureConfigResolver};
use crate::mode::{current_mode, CapabilityMode, MODE_ANNOTATION};
use crate::{Error, CONTROLLER_NAME};

/// Delay before re-checking credentials after a successful run
///
/// Every run costs three IAM calls, and changes to the secret itself
/// trigger a run right away, so this only bounds how long a cloud-side
/// permission change can go unnoticed.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Delay before retrying a failed run
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Trait abstracting reads and writes of the credentials secret
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Fetch a secret, failing with [`Error::NotFound`] if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, Error>;

    /// Write back the whole secret
    ///
    /// The secret's resourceVersion is sent along, so a concurrent change
    /// makes this fail with a conflict instead of being overwritten.
    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct SecretClientImpl {
    client: Client,
}

impl SecretClientImpl {
    /// Create a new SecretClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretClient for SecretClientImpl {
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await?
            .ok_or_else(|| Error::not_found(namespace, name))
    }

    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };
        api.replace(name, &params, secret)
            .await
            .map_err(|e| Error::persistence_from_kube(namespace, name, &e))?;
        Ok(())
    }
}

/// Controller context shared by every reconciliation
pub struct Context {
    /// Secret reads and writes (trait object for testability)
    pub secrets: Arc<dyn SecretClient>,
    /// Infrastructure name lookup
    pub infra: Arc<dyn InfraNameResolver>,
    /// Cloud client construction
    pub cloud: Arc<dyn CloudClientBuilder>,
    /// Kubernetes Event publishing
    pub events: Arc<dyn EventPublisher>,
    /// Requeue delay after a successful run
    pub resync_interval: Duration,
    /// Requeue delay after a failed run
    pub retry_interval: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom mock collaborators
    ///
    /// Events are dropped and the default intervals apply.
    #[cfg(test)]
    pub fn for_testing(
        secrets: Arc<dyn SecretClient>,
        infra: Arc<dyn InfraNameResolver>,
        cloud: Arc<dyn CloudClientBuilder>,
    ) -> Self {
        Self {
            secrets,
            infra,
            cloud,
            events: Arc::new(crate::events::NoopEventPublisher),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Anything not overridden talks to the cluster through `client`, and the
/// cloud probes go to AWS IAM in the default region:
/// ```ignore
/// let ctx = Context::builder(client)
///     .infra_resolver(Arc::new(StaticInfraName::new("prod-7x2kq")))
///     .resync_interval(Duration::from_secs(600))
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    secrets: Option<Arc<dyn SecretClient>>,
    infra: Option<Arc<dyn InfraNameResolver>>,
    cloud: Option<Arc<dyn CloudClientBuilder>>,
    events: Option<Arc<dyn EventPublisher>>,
    resync_interval: Duration,
    retry_interval: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            secrets: None,
            infra: None,
            cloud: None,
            events: None,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the secret client (primarily for testing)
    pub fn secret_client(mut self, secrets: Arc<dyn SecretClient>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Override the infrastructure name resolver
    pub fn infra_resolver(mut self, infra: Arc<dyn InfraNameResolver>) -> Self {
        self.infra = Some(infra);
        self
    }

    /// Override the cloud client builder
    pub fn cloud_builder(mut self, cloud: Arc<dyn CloudClientBuilder>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the requeue delay after a successful run
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Set the requeue delay after a failed run
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            secrets: self
                .secrets
                .unwrap_or_else(|| Arc::new(SecretClientImpl::new(self.client.clone()))),
            infra: self.infra.unwrap_or_else(|| {
                Arc::new(InfrastructureConfigResolver::new(self.client.clone()))
            }),
            cloud: self
                .cloud
                .unwrap_or_else(|| Arc::new(AwsClientBuilder::default())),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            resync_interval: self.resync_interval,
            retry_interval: self.retry_interval,
        }
    }
}

/// Outcome of classifying the credentials
#[derive(Debug)]
enum Verdict {
    /// A definitive mode
    Settled(CapabilityMode),
    /// A probe failed; record `insufficient` and surface the failure
    FailClosed(Error),
}

impl Verdict {
    fn mode(&self) -> CapabilityMode {
        match self {
            Verdict::Settled(mode) => *mode,
            Verdict::FailClosed(_) => CapabilityMode::Insufficient,
        }
    }
}

/// Reconcile the credentials secret
///
/// `secret` only identifies the object; the current state is fetched again.
/// On success the secret is re-run after the resync interval so that
/// permission changes made on the cloud side are eventually picked up.
#[instrument(skip(secret, ctx), fields(secret = %ReconcileRequest::for_secret(&secret)))]
pub async fn reconcile(secret: Arc<Secret>, ctx: Arc<Context>) -> Result<Action, Error> {
    let request = ReconcileRequest::for_secret(&secret);
    let mode = reconcile_mode(&request, &ctx).await?;
    debug!(mode = %mode, "reconciliation complete");
    Ok(Action::requeue(ctx.resync_interval))
}

/// Decide and persist the capability mode for one request
///
/// Returns the mode written. Fails without writing anything if the secret
/// is missing, the infrastructure name cannot be resolved or the cloud
/// client cannot be built. A probe failure writes `insufficient` and then
/// returns the probe error.
pub async fn reconcile_mode(
    request: &ReconcileRequest,
    ctx: &Context,
) -> Result<CapabilityMode, Error> {
    let secret = match ctx.secrets.get(&request.namespace, &request.name).await {
        Ok(secret) => secret,
        Err(e) if e.is_not_found() => {
            debug!("secret not found");
            return Err(e);
        }
        Err(e) => {
            error!(error = %e, "failed to fetch secret");
            return Err(e);
        }
    };

    info!("validating cloud cred secret");
    let verdict = determine_mode(&secret, ctx).await?;
    let mode = verdict.mode();

    let written = annotate(secret, mode, request, ctx).await;
    match verdict {
        Verdict::Settled(_) => written.map(|()| mode),
        Verdict::FailClosed(probe_error) => {
            if let Err(e) = written {
                warn!(error = %e, "failed to record insufficient mode after probe error");
            }
            Err(probe_error)
        }
    }
}

/// Classify the credentials held by `secret`
///
/// Errors are environment failures that happen before any verdict can be
/// reached; probe failures come back as [`Verdict::FailClosed`].
async fn determine_mode(secret: &Secret, ctx: &Context) -> Result<Verdict, Error> {
    let creds = match AwsCredentials::from_secret(secret) {
        Ok(creds) => creds,
        Err(missing) => {
            error!(field = missing.0, "{}", missing);
            return Ok(Verdict::Settled(CapabilityMode::Insufficient));
        }
    };

    let infra_name = ctx.infra.infra_name().await?;

    let probe = ctx.cloud.build(&creds, &infra_name).await.map_err(|e| {
        error!(error = %e, "failed to create cloud client");
        match e {
            Error::Environment { .. } => e,
            other => Error::environment(
                "cloud-client",
                format!("failed to create cloud client: {}", other),
            ),
        }
    })?;

    match probe.can_mint().await {
        Err(e) => {
            error!(error = %e, "error checking whether cloud creds can mint");
            return Ok(Verdict::FailClosed(probe_failure(ProbeKind::Mint, e)));
        }
        Ok(true) => {
            info!("verified cloud creds can be used for minting new creds");
            return Ok(Verdict::Settled(CapabilityMode::Mint));
        }
        Ok(false) => {}
    }

    match probe.can_passthrough().await {
        Err(e) => {
            error!(error = %e, "error checking whether cloud creds can be passed through");
            Ok(Verdict::FailClosed(probe_failure(ProbeKind::Passthrough, e)))
        }
        Ok(true) => {
            info!("verified cloud creds can be used as-is (passthrough)");
            Ok(Verdict::Settled(CapabilityMode::Passthrough))
        }
        Ok(false) => {
            warn!("cloud creds are insufficient for minting or passthrough");
            Ok(Verdict::Settled(CapabilityMode::Insufficient))
        }
    }
}

fn probe_failure(probe: ProbeKind, e: Error) -> Error {
    match e {
        Error::Probe { .. } => e,
        other => Error::probe(probe, other.to_string()),
    }
}

/// Write `mode` onto the secret, then announce it if it changed
///
/// The write happens even when the annotation already holds `mode`.
async fn annotate(
    mut secret: Secret,
    mode: CapabilityMode,
    request: &ReconcileRequest,
    ctx: &Context,
) -> Result<(), Error> {
    let previous = current_mode(&secret);

    secret
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(MODE_ANNOTATION.to_string(), mode.to_string());

    ctx.secrets
        .replace(&request.namespace, &request.name, &secret)
        .await?;
    debug!(mode = %mode, "annotated secret");

    if let Some(event) = mode_changed_event(previous, mode) {
        ctx.events.publish(&secret.object_ref(&()), event).await;
    }

    Ok(())
}

/// Decide what to do after a failed reconciliation
///
/// A missing secret waits for the create notification that brings it back.
/// Everything else is retried after the retry interval.
pub fn error_policy(secret: Arc<Secret>, error: &Error, ctx: Arc<Context>) -> Action {
    let request = ReconcileRequest::for_secret(&secret);
    if error.is_not_found() {
        debug!(secret = %request, "secret not found, waiting for it to be created");
        return Action::await_change();
    }

    error!(
        error = %error,
        secret = %request,
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ctx.retry_interval)
    } else {
        Action::await_change()
    }
}
