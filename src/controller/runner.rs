//! Controller wiring for the cloud credentials secret
//!
//! Secrets in `kube-system` are watched and reflected into a store. Watch
//! events pass through the event filter, and only the admitted credentials
//! secret triggers the `kube` runtime controller. The controller
//! deduplicates requests, runs one reconciliation per object at a time and
//! applies the returned `Action`.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::{Action, Error as ControllerError};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, error, info};

use super::filter::{admitted, NotificationTracker};
use super::secret::{error_policy, reconcile, Context};
use crate::{Error, CLOUD_CRED_SECRET_NAMESPACE};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
///
/// Makes the API server close idle watches before the client gives up on them.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the controller until SIGINT/SIGTERM or until the watch stream ends
pub async fn run(client: Client, ctx: Arc<Context>) {
    let secrets: Api<Secret> = Api::namespaced(client, CLOUD_CRED_SECRET_NAMESPACE);
    let (reader, writer) = reflector::store();

    let mut tracker = NotificationTracker::new();
    let triggers = watcher(secrets, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff()
        .modify(strip_payload)
        .reflect(writer)
        .map_ok(move |event| {
            stream::iter(
                admitted(&mut tracker, event)
                    .into_iter()
                    .map(Ok::<_, watcher::Error>),
            )
        })
        .try_flatten();

    info!(
        namespace = CLOUD_CRED_SECRET_NAMESPACE,
        "Starting secret annotator controller"
    );

    Controller::for_stream(triggers, reader)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            log_reconcile_result(result);
            std::future::ready(())
        })
        .await;
}

/// Drop secret values before they reach the reflector store
///
/// Reconciliation always re-reads the secret, so the store only needs
/// object identities.
fn strip_payload(secret: &mut Secret) {
    secret.data = None;
    secret.string_data = None;
}

fn log_reconcile_result(
    result: Result<(ObjectRef<Secret>, Action), ControllerError<Error, watcher::Error>>,
) {
    match result {
        Ok((secret, action)) => debug!(%secret, ?action, "Secret reconciliation completed"),
        Err(ControllerError::ObjectNotFound(secret)) => {
            debug!(%secret, "Secret is gone, nothing to reconcile")
        }
        Err(e) => error!(error = ?e, "Secret reconciliation error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    #[test]
    fn test_store_keeps_identity_but_not_values() {
        let mut secret = Secret {
            metadata: ObjectMeta {
                namespace: Some("kube-system".to_string()),
                name: Some("aws-creds".to_string()),
                annotations: Some(BTreeMap::from([(
                    "cloudcredential.openshift.io/mode".to_string(),
                    "mint".to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "aws_secret_access_key".to_string(),
                ByteString(b"wJalrXUtnFEMI".to_vec()),
            )])),
            string_data: Some(BTreeMap::from([(
                "aws_access_key_id".to_string(),
                "AKIDEXAMPLE".to_string(),
            )])),
            ..Default::default()
        };

        strip_payload(&mut secret);

        assert!(secret.data.is_none());
        assert!(secret.string_data.is_none());
        assert_eq!(secret.metadata.name.as_deref(), Some("aws-creds"));
        assert!(secret.metadata.annotations.is_some());
    }

    #[test]
    fn test_watch_timeout_is_below_client_read_timeout() {
        assert!(WATCH_TIMEOUT_SECS < 30);
    }
}
