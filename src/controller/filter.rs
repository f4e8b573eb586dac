//! Event filter for the secret watch
//!
//! The watch on `kube-system` secrets sees every secret in the namespace. Only
//! the cloud credentials secret is interesting; everything else is dropped
//! here before it can trigger a reconciliation.

use std::collections::HashSet;
use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::runtime::watcher;
use kube::ResourceExt;

use crate::{CLOUD_CRED_SECRET_NAME, CLOUD_CRED_SECRET_NAMESPACE};

/// Identity of an object to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ReconcileRequest {
    /// Create a request for the given object identity
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The well-known cloud credentials secret
    pub fn cloud_cred_secret() -> Self {
        Self::new(CLOUD_CRED_SECRET_NAMESPACE, CLOUD_CRED_SECRET_NAME)
    }

    /// Identity of a watched secret
    pub fn for_secret(secret: &Secret) -> Self {
        Self::new(secret.namespace().unwrap_or_default(), secret.name_any())
    }

    /// A payload-free secret carrying only this identity
    fn placeholder(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some(self.namespace.clone()),
                name: Some(self.name.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A change notification for one object in the watched collection
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The object appeared
    Create(Secret),
    /// The object changed, or was seen again on a re-list
    Update(Secret),
    /// The object is gone
    Delete(Secret),
}

impl Notification {
    /// The object this notification is about
    pub fn object(&self) -> &Secret {
        match self {
            Notification::Create(s) | Notification::Update(s) | Notification::Delete(s) => s,
        }
    }

    /// Consume the notification, keeping the object
    pub fn into_object(self) -> Secret {
        match self {
            Notification::Create(s) | Notification::Update(s) | Notification::Delete(s) => s,
        }
    }

    /// Identity of the object this notification is about
    pub fn request(&self) -> ReconcileRequest {
        ReconcileRequest::for_secret(self.object())
    }
}

/// Whether the object is the cloud credentials secret
pub fn is_cloud_cred_secret(namespace: &str, name: &str) -> bool {
    namespace == CLOUD_CRED_SECRET_NAMESPACE && name == CLOUD_CRED_SECRET_NAME
}

/// Admission predicate for reconcile triggers
///
/// Creates, updates and deletes are judged the same way: only the exact
/// cloud credentials secret gets through.
pub fn admits(notification: &Notification) -> bool {
    let secret = notification.object();
    is_cloud_cred_secret(
        secret.metadata.namespace.as_deref().unwrap_or_default(),
        secret.metadata.name.as_deref().unwrap_or_default(),
    )
}

/// Turns the watcher's event stream into create/update/delete notifications
///
/// The watcher only reports "object applied" and "object deleted", and a
/// re-list after a watch desync reports the full current set without
/// deletes. The tracker remembers which objects it has seen so that first
/// sightings become creates and objects missing from a re-list become deletes.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    seen: HashSet<ReconcileRequest>,
    relisted: Option<HashSet<ReconcileRequest>>,
}

impl NotificationTracker {
    /// Create a tracker with no known objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one watcher event into zero or more notifications
    ///
    /// Deletes missed across a re-list carry a placeholder secret holding
    /// only the object identity.
    pub fn observe(&mut self, event: watcher::Event<Secret>) -> Vec<Notification> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(secret) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(ReconcileRequest::for_secret(&secret));
                }
                vec![self.applied(secret)]
            }
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<Notification> = self
                    .seen
                    .difference(&relisted)
                    .map(|request| Notification::Delete(request.placeholder()))
                    .collect();
                self.seen = relisted;
                gone
            }
            watcher::Event::Apply(secret) => vec![self.applied(secret)],
            watcher::Event::Delete(secret) => {
                self.seen.remove(&ReconcileRequest::for_secret(&secret));
                vec![Notification::Delete(secret)]
            }
        }
    }

    fn applied(&mut self, secret: Secret) -> Notification {
        if self.seen.insert(ReconcileRequest::for_secret(&secret)) {
            Notification::Create(secret)
        } else {
            Notification::Update(secret)
        }
    }
}

/// Admitted objects for one watch event
///
/// Feeds the controller's trigger stream; anything that is not the cloud
/// credentials secret never reaches the scheduler.
pub fn admitted(tracker: &mut NotificationTracker, event: watcher::Event<Secret>) -> Vec<Secret> {
    tracker
        .observe(event)
        .into_iter()
        .filter(|notification| {
            let admit = admits(notification);
            if !admit {
                tracing::trace!(secret = %notification.request(), "ignoring notification");
            }
            admit
        })
        .map(Notification::into_object)
        .collect()
}
