//! Kubernetes Events announcing capability mode changes
//!
//! Events land on the credentials secret, so `kubectl describe secret
//! aws-creds -n kube-system` shows when the mode moved and from what.
//! Publishing is fire-and-forget: a failed event is logged and never fails
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::mode::CapabilityMode;

/// Event reason for a persisted mode transition
pub const REASON_MODE_CHANGED: &str = "CredentialModeChanged";

/// Event action for writing the mode annotation
pub const ACTION_ANNOTATE: &str = "Annotate";

/// Publishes Kubernetes Events about an object
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` on the object behind `resource_ref`
    async fn publish(&self, resource_ref: &ObjectReference, event: Event);
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    ///
    /// The pod name (from `POD_NAME`) identifies the instance when set.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, resource_ref: &ObjectReference, event: Event) {
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason = %event.reason,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Drops every event (one-shot runs and tests)
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _resource_ref: &ObjectReference, _event: Event) {}
}

/// Event for a mode transition, or `None` if the mode did not change
///
/// Dropping to `insufficient` is a Warning; anything else is Normal.
pub fn mode_changed_event(
    previous: Option<CapabilityMode>,
    current: CapabilityMode,
) -> Option<Event> {
    if previous == Some(current) {
        return None;
    }

    let type_ = match current {
        CapabilityMode::Insufficient => EventType::Warning,
        CapabilityMode::Mint | CapabilityMode::Passthrough => EventType::Normal,
    };
    let from = previous.map_or("unset", |m| m.as_str());

    Some(Event {
        type_,
        reason: REASON_MODE_CHANGED.to_string(),
        note: Some(format!(
            "Cloud credentials mode changed from {} to {}",
            from, current
        )),
        action: ACTION_ANNOTATE.to_string(),
        secondary: None,
    })
}
