//! Controller for the cloud credentials secret
//!
//! `filter` turns watch events into admitted reconcile triggers, `secret`
//! reconciles one secret and `runner` hands both to the `kube` runtime
//! controller.

mod filter;
mod runner;
mod secret;

pub use filter::{
    admits, admitted, is_cloud_cred_secret, Notification, NotificationTracker, ReconcileRequest,
};
pub use runner::{run, WATCH_TIMEOUT_SECS};
pub use secret::{
    error_policy, reconcile, reconcile_mode, Context, ContextBuilder, SecretClient,
    SecretClientImpl, DEFAULT_RESYNC_INTERVAL, DEFAULT_RETRY_INTERVAL,
};
