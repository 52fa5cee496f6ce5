//! # connectorctl
//!
//! Command-line companion for the connector controller.
//!
//! ## Usage
//!
//! ```bash
//! # Check a secret address
//! connectorctl parse 'vault:secret/data/app/db#DATABASE_PASSWORD'
//!
//! # Explain why a pod did not get its connector variables
//! connectorctl diagnose --namespace default --pod billing-7d9f8-abcde
//!
//! # Source hash (lock key) of an external resource
//! connectorctl hash pg.svc 5432 billing billing
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connector_controller::config::VaultConfig;
use connector_controller::constants::DEFAULT_ADAPTER_TIMEOUT_SECS;
use connector_controller::controller::cluster::{ClusterGateway, KubeCluster};
use connector_controller::controller::engine::EngineContext;
use connector_controller::controller::hashing::source_hash;
use connector_controller::controller::validation::diagnose_pod;
use connector_controller::controller::ConnectorSet;
use connector_controller::vault::{SecretAddress, SecretGateway, VaultBackend};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

/// Connector controller CLI
#[derive(Parser)]
#[command(name = "connectorctl")]
#[command(about = "Connector controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a secret address and print its parts
    Parse {
        /// Address such as `vault:secret/data/app/db#KEY`
        address: String,
    },
    /// Run the validation service against a live pod
    Diagnose {
        /// Namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Name of the pod
        #[arg(short, long)]
        pod: String,
    },
    /// Print the source hash of the given identity parts
    Hash {
        /// Identity parts in order
        #[arg(required = true)]
        parts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connectorctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { address } => parse_command(&address),
        Commands::Diagnose { namespace, pod } => diagnose_command(&namespace, &pod).await,
        Commands::Hash { parts } => {
            println!("{}", source_hash(&parts)?);
            Ok(())
        }
    }
}

fn parse_command(raw: &str) -> Result<()> {
    let address = SecretAddress::parse(raw).with_context(|| format!("Invalid address '{raw}'"))?;
    println!("mount: {}", address.mount());
    println!("path:  {}", address.path());
    println!("key:   {}", address.key().unwrap_or("-"));
    Ok(())
}

async fn diagnose_command(namespace: &str, pod_name: &str) -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let backend = VaultBackend::connect(VaultConfig::from_env())
        .await
        .context("Failed to connect to Vault")?;
    let cluster = Arc::new(KubeCluster::new(client));
    let ctx = EngineContext::new(
        Arc::clone(&cluster) as Arc<dyn ClusterGateway>,
        SecretGateway::new(Arc::new(backend)),
    );
    let connectors =
        ConnectorSet::with_adapters(Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS))?;

    let pod = cluster
        .get_pod(namespace, pod_name)
        .await?
        .with_context(|| format!("Pod '{namespace}/{pod_name}' not found"))?;

    let events = diagnose_pod(&connectors, &ctx, &pod, namespace, false).await;
    if events.is_empty() {
        println!("No connector problems found for '{namespace}/{pod_name}'.");
        return Ok(());
    }
    for (_, event) in events {
        println!("{}:", event.reason);
        for line in event.message.lines() {
            println!("  - {line}");
        }
    }
    Ok(())
}
