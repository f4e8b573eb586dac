//! Secret Annotator - records what the cluster cloud credentials can do

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::Client;

use secret_annotator::cloud::aws::DEFAULT_IAM_REGION;
use secret_annotator::cloud::AwsClientBuilder;
use secret_annotator::controller::{
    self, reconcile_mode, Context, ReconcileRequest, DEFAULT_RESYNC_INTERVAL,
    DEFAULT_RETRY_INTERVAL,
};
use secret_annotator::infrastructure::StaticInfraName;
use secret_annotator::telemetry::{init_tracing, LogFormat};
use secret_annotator::Error;

/// Secret Annotator - classifies the cluster cloud credentials as mint, passthrough or insufficient
#[derive(Parser, Debug)]
#[command(name = "secret-annotator", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(flatten)]
    shared: SharedArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches the cloud credentials secret and keeps its mode annotation
    /// current, re-checking periodically.
    Controller,

    /// Reconcile the cloud credentials secret once and print the mode
    Check,
}

/// Arguments shared by every mode
#[derive(Args, Debug, Clone)]
struct SharedArgs {
    /// Region for the IAM endpoint used by the capability probes
    #[arg(long, global = true, env = "AWS_IAM_REGION", default_value = DEFAULT_IAM_REGION)]
    aws_region: String,

    /// Fixed infrastructure name (read from the cluster Infrastructure config when unset)
    #[arg(long, global = true, env = "INFRASTRUCTURE_NAME")]
    infrastructure_name: Option<String>,

    /// Seconds between re-checks after a successful reconciliation
    #[arg(
        long,
        global = true,
        env = "RESYNC_INTERVAL_SECS",
        default_value_t = DEFAULT_RESYNC_INTERVAL.as_secs()
    )]
    resync_interval_secs: u64,

    /// Seconds before retrying a failed reconciliation
    #[arg(
        long,
        global = true,
        env = "RETRY_INTERVAL_SECS",
        default_value_t = DEFAULT_RETRY_INTERVAL.as_secs()
    )]
    retry_interval_secs: u64,
}

impl SharedArgs {
    fn validate(&self) -> Result<(), Error> {
        if self.resync_interval_secs == 0 {
            return Err(Error::validation("resync interval must be positive"));
        }
        if self.retry_interval_secs == 0 {
            return Err(Error::validation("retry interval must be positive"));
        }
        if self.aws_region.is_empty() {
            return Err(Error::validation("AWS region must not be empty"));
        }
        if self.infrastructure_name.as_deref() == Some("") {
            return Err(Error::validation("infrastructure name must not be empty"));
        }
        Ok(())
    }

    fn context(&self, client: Client) -> Context {
        let mut builder = Context::builder(client)
            .cloud_builder(Arc::new(AwsClientBuilder::new(self.aws_region.clone())))
            .resync_interval(Duration::from_secs(self.resync_interval_secs))
            .retry_interval(Duration::from_secs(self.retry_interval_secs));
        if let Some(name) = &self.infrastructure_name {
            tracing::info!(infra_name = %name, "Using fixed infrastructure name");
            builder = builder.infra_resolver(Arc::new(StaticInfraName::new(name.clone())));
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    // kube and the AWS SDK both need a process-wide TLS provider.
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install FIPS-validated crypto provider: {:?}. \
             The application cannot operate securely without a working TLS implementation.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_tracing(cli.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Some(Commands::Check) => run_check(cli.shared).await,
        Some(Commands::Controller) | None => run_controller(cli.shared).await,
    }
}

/// Run the controller until SIGINT/SIGTERM
async fn run_controller(args: SharedArgs) -> anyhow::Result<()> {
    args.validate()?;
    tracing::info!("Secret annotator controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let ctx = Arc::new(args.context(client.clone()));

    controller::run(client, ctx).await;

    tracing::info!("Secret annotator controller shutting down");
    Ok(())
}

/// Reconcile once and print the resulting mode
async fn run_check(args: SharedArgs) -> anyhow::Result<()> {
    args.validate()?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let ctx = args.context(client);

    let request = ReconcileRequest::cloud_cred_secret();
    let mode = reconcile_mode(&request, &ctx)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reconcile {}: {}", request, e))?;

    println!("{}", mode);
    Ok(())
}
