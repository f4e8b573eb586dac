//! Integration tests for the mode annotation
//!
//! Each test creates its own secret in the `default` namespace, reconciles
//! it against a fixed cloud, and reads the annotation back from the API
//! server.

use secret_annotator::controller::{reconcile_mode, ReconcileRequest};
use secret_annotator::mode::CapabilityMode;
use secret_annotator::Error;

use super::helpers::{
    creds_secret, delete_secret, ensure_test_cluster, persisted_mode, recreate_secret,
    test_context, Answer, FixedCloud, TEST_NAMESPACE,
};

/// Story: An installer provisions admin-level credentials
///
/// Expected behavior:
/// - The secret is annotated `mint`
/// - A second run leaves the same annotation in place
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_credentials_are_marked_mint() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "annotator-test-mint";
    recreate_secret(&client, &creds_secret(name, true)).await;

    let ctx = test_context(
        client.clone(),
        FixedCloud {
            mint: Answer::Allowed,
            passthrough: Answer::Allowed,
        },
    );
    let request = ReconcileRequest::new(TEST_NAMESPACE, name);

    let first = reconcile_mode(&request, &ctx)
        .await
        .expect("reconcile should succeed");
    let second = reconcile_mode(&request, &ctx)
        .await
        .expect("second reconcile should succeed");

    assert_eq!(first, CapabilityMode::Mint);
    assert_eq!(second, CapabilityMode::Mint);
    assert_eq!(persisted_mode(&client, name).await.as_deref(), Some("mint"));

    delete_secret(&client, name).await;
}

/// Story: An operator hands the cluster credentials scoped to what its
/// components need, without IAM user management
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_scoped_credentials_are_marked_passthrough() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "annotator-test-passthrough";
    recreate_secret(&client, &creds_secret(name, true)).await;

    let ctx = test_context(
        client.clone(),
        FixedCloud {
            mint: Answer::Denied,
            passthrough: Answer::Allowed,
        },
    );

    let mode = reconcile_mode(&ReconcileRequest::new(TEST_NAMESPACE, name), &ctx)
        .await
        .expect("reconcile should succeed");

    assert_eq!(mode, CapabilityMode::Passthrough);
    assert_eq!(
        persisted_mode(&client, name).await.as_deref(),
        Some("passthrough")
    );

    delete_secret(&client, name).await;
}

/// Story: Someone edits the secret and drops the secret access key
///
/// The credentials cannot be used at all, so they are insufficient; the
/// cloud is never asked.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_incomplete_secret_is_marked_insufficient() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "annotator-test-incomplete";
    recreate_secret(&client, &creds_secret(name, false)).await;

    let ctx = test_context(
        client.clone(),
        FixedCloud {
            mint: Answer::Allowed,
            passthrough: Answer::Allowed,
        },
    );

    let mode = reconcile_mode(&ReconcileRequest::new(TEST_NAMESPACE, name), &ctx)
        .await
        .expect("missing fields are a verdict, not an error");

    assert_eq!(mode, CapabilityMode::Insufficient);
    assert_eq!(
        persisted_mode(&client, name).await.as_deref(),
        Some("insufficient")
    );

    delete_secret(&client, name).await;
}

/// Story: The cloud endpoint is unreachable while checking credentials
///
/// The annotation is downgraded to `insufficient` and the failure is still
/// reported so the controller retries.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_unreachable_cloud_fails_closed() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "annotator-test-unreachable";
    recreate_secret(&client, &creds_secret(name, true)).await;

    let ctx = test_context(
        client.clone(),
        FixedCloud {
            mint: Answer::Unreachable,
            passthrough: Answer::Allowed,
        },
    );

    let err = reconcile_mode(&ReconcileRequest::new(TEST_NAMESPACE, name), &ctx)
        .await
        .expect_err("probe failure must be reported");

    assert!(matches!(err, Error::Probe { .. }));
    assert_eq!(
        persisted_mode(&client, name).await.as_deref(),
        Some("insufficient")
    );

    delete_secret(&client, name).await;
}

/// Story: The secret has not been created yet
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_secret_is_not_found() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "annotator-test-missing";
    delete_secret(&client, name).await;

    let ctx = test_context(
        client.clone(),
        FixedCloud {
            mint: Answer::Allowed,
            passthrough: Answer::Allowed,
        },
    );

    let err = reconcile_mode(&ReconcileRequest::new(TEST_NAMESPACE, name), &ctx)
        .await
        .expect_err("missing secret must be reported");

    assert!(err.is_not_found());
}
