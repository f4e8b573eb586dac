//! AWS capability probes
//!
//! Both probes work the same way: look up the IAM user behind the
//! credentials, then ask IAM to simulate that user's policies against a fixed
//! list of actions. The probe passes only if every action is allowed.

use std::collections::HashSet;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::types::PolicyEvaluationDecisionType;
use aws_types::app_name::AppName;
use aws_types::region::Region;
use tracing::{debug, warn};

use super::{CapabilityProbe, CloudClientBuilder};
use crate::credentials::AwsCredentials;
use crate::Error;

/// IAM is a global service; its endpoint lives in us-east-1 for the aws partition
pub const DEFAULT_IAM_REGION: &str = "us-east-1";

const PROVIDER: &str = "aws";
const CREDENTIALS_SOURCE: &str = "secret-annotator";
const APP_NAME_PREFIX: &str = "secret-annotator";

/// Actions the credentials need to create and manage per-component IAM users
pub const CRED_MINTING_ACTIONS: &[&str] = &[
    "iam:CreateAccessKey",
    "iam:CreateUser",
    "iam:DeleteAccessKey",
    "iam:DeleteUser",
    "iam:DeleteUserPolicy",
    "iam:GetUser",
    "iam:GetUserPolicy",
    "iam:ListAccessKeys",
    "iam:PutUserPolicy",
    "iam:TagUser",
    // needed to verify everything above
    "iam:SimulatePrincipalPolicy",
];

/// Actions cluster components perform when handed the credentials as-is
pub const CRED_PASSTHROUGH_ACTIONS: &[&str] = &[
    // machine management
    "ec2:CreateTags",
    "ec2:DescribeAvailabilityZones",
    "ec2:DescribeDhcpOptions",
    "ec2:DescribeImages",
    "ec2:DescribeInstances",
    "ec2:DescribeInternetGateways",
    "ec2:DescribeRegions",
    "ec2:DescribeSecurityGroups",
    "ec2:DescribeSubnets",
    "ec2:DescribeVpcs",
    "ec2:RunInstances",
    "ec2:TerminateInstances",
    // load balancers
    "elasticloadbalancing:DescribeLoadBalancers",
    "elasticloadbalancing:DescribeTargetGroups",
    "elasticloadbalancing:DescribeTargetHealth",
    "elasticloadbalancing:DeregisterInstancesFromLoadBalancer",
    "elasticloadbalancing:DeregisterTargets",
    "elasticloadbalancing:RegisterInstancesWithLoadBalancer",
    "elasticloadbalancing:RegisterTargets",
    // instance profiles
    "iam:PassRole",
    // ingress DNS
    "route53:ChangeResourceRecordSets",
    "route53:ListHostedZones",
    "route53:ListTagsForResources",
    "tag:GetResources",
    // image registry storage
    "s3:CreateBucket",
    "s3:DeleteBucket",
    "s3:PutBucketTagging",
    "s3:GetBucketTagging",
    "s3:PutEncryptionConfiguration",
    "s3:GetEncryptionConfiguration",
    "s3:PutLifecycleConfiguration",
    "s3:GetLifecycleConfiguration",
    "s3:GetBucketLocation",
    "s3:ListBucket",
    "s3:GetObject",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:ListBucketMultipartUploads",
    "s3:AbortMultipartUpload",
];

/// Builds IAM-backed probes from static credentials
#[derive(Debug, Clone)]
pub struct AwsClientBuilder {
    region: String,
}

impl Default for AwsClientBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_IAM_REGION)
    }
}

impl AwsClientBuilder {
    /// Create a builder that talks to IAM in `region`
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// The region IAM requests are sent to
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl CloudClientBuilder for AwsClientBuilder {
    async fn build(
        &self,
        credentials: &AwsCredentials,
        infra_name: &str,
    ) -> Result<Box<dyn CapabilityProbe>, Error> {
        let static_creds = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_SOURCE,
        );

        let mut config = aws_sdk_iam::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(static_creds);

        match AppName::new(app_name(infra_name)) {
            Ok(name) => config = config.app_name(name),
            Err(e) => {
                warn!(
                    infra_name,
                    error = %e,
                    "infrastructure name is not a valid AWS app name, requests will be untagged"
                );
            }
        }

        debug!(region = %self.region, infra_name, "Built AWS IAM client");

        Ok(Box::new(AwsIamProbe {
            client: aws_sdk_iam::Client::from_conf(config.build()),
        }))
    }
}

/// App name attached to every IAM request made for this cluster
fn app_name(infra_name: &str) -> String {
    format!("{}-{}", APP_NAME_PREFIX, infra_name)
}

/// IAM policy-simulation probe for one set of credentials
struct AwsIamProbe {
    client: aws_sdk_iam::Client,
}

impl AwsIamProbe {
    /// ARN of the IAM user owning the credentials
    async fn caller_arn(&self) -> Result<String, Error> {
        let output = self.client.get_user().send().await.map_err(|e| {
            Error::cloud(
                PROVIDER,
                format!("error querying username: {}", DisplayErrorContext(&e)),
            )
        })?;

        output
            .user()
            .map(|user| user.arn().to_string())
            .ok_or_else(|| Error::cloud(PROVIDER, "GetUser returned no user"))
    }

    /// Simulate the caller's policies against `actions`
    async fn check_actions(&self, actions: &[&str]) -> Result<bool, Error> {
        let arn = self.caller_arn().await?;

        let output = self
            .client
            .simulate_principal_policy()
            .policy_source_arn(arn)
            .set_action_names(Some(actions.iter().map(|a| a.to_string()).collect()))
            .send()
            .await
            .map_err(|e| {
                Error::cloud(
                    PROVIDER,
                    format!("error simulating policy: {}", DisplayErrorContext(&e)),
                )
            })?;

        let decisions = output.evaluation_results().iter().map(|result| {
            (
                result.eval_action_name(),
                result.eval_decision() == &PolicyEvaluationDecisionType::Allowed,
            )
        });

        let denied = denied_actions(actions, decisions);
        if denied.is_empty() {
            return Ok(true);
        }

        for action in &denied {
            warn!(action = %action, "Action not allowed with tested creds");
        }
        warn!(
            denied = denied.len(),
            "Tested creds not able to perform all requested actions"
        );
        Ok(false)
    }
}

#[async_trait]
impl CapabilityProbe for AwsIamProbe {
    async fn can_mint(&self) -> Result<bool, Error> {
        self.check_actions(CRED_MINTING_ACTIONS).await
    }

    async fn can_passthrough(&self) -> Result<bool, Error> {
        self.check_actions(CRED_PASSTHROUGH_ACTIONS).await
    }
}

/// Requested actions that were not positively allowed
///
/// An action the simulation did not report on counts as denied.
fn denied_actions<'a>(
    requested: &[&str],
    decisions: impl IntoIterator<Item = (&'a str, bool)>,
) -> Vec<String> {
    let allowed: HashSet<&str> = decisions
        .into_iter()
        .filter_map(|(action, allowed)| allowed.then_some(action))
        .collect();

    requested
        .iter()
        .filter(|action| !allowed.contains(**action))
        .map(|action| action.to_string())
        .collect()
}
