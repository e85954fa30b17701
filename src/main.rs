//! Replicator - keeps a ConfigMap in every namespace matching a label selector

use clap::{CommandFactory, Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use replicator::config::ControllerArgs;
use replicator::crd::ConfigMapReplica;
use replicator::telemetry::{init_telemetry, TelemetryConfig};

/// Replicator - ConfigMap replication controller
#[derive(Parser, Debug)]
#[command(name = "replicator", version, about, long_about = None)]
struct Cli {
    /// Print the ConfigMapReplica CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller
    ///
    /// Watches ConfigMapReplicas, their copies and namespaces, and keeps one
    /// copy of each replica's template in every namespace its selector
    /// matches.
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ConfigMapReplica::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::with_format(args.log_format))?;

    let config = args.to_config();
    tracing::info!(
        field_manager = %config.field_manager,
        prune = config.prune,
        failure_requeue_secs = config.failure_requeue.as_secs(),
        "Starting replicator controller"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    replicator::runner::run(client, config).await;
    Ok(())
}
