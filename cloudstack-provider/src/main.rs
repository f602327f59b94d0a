//! cloudstack-provider: CloudStack resource handlers on the command line.
//!
//! - `nic create|read|delete` manages a unique NIC (one NIC per VM on a network)
//! - `cluster-config` reads the kubeconfig of a managed Kubernetes cluster
//! - `schema` prints the attribute schema of a resource or data source
//!
//! State is printed as JSON on stdout; logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloudstack_provider::config::DEFAULT_TIMEOUT_SECS;
use cloudstack_provider::retry::{DEFAULT_ATTACH_ATTEMPTS, RetryConfig, RetryPolicy};
use cloudstack_provider::schema::{kubernetes_cluster_config_schema, unique_nic_schema};
use cloudstack_provider::{
    ClusterConfigQuery, DataSource, HttpClient, KubernetesClusterConfigSource, ProviderConfig,
    Resource, UniqueNic, UniqueNicConfig, UniqueNicState,
};

/// CloudStack provider handlers
#[derive(Parser, Debug)]
#[command(name = "cloudstack-provider", version, about)]
struct Args {
    /// CloudStack API endpoint (e.g., https://cloud.example.com/client/api)
    #[arg(long, env = "CLOUDSTACK_API_URL", default_value = "")]
    api_url: String,

    /// API key
    #[arg(long, env = "CLOUDSTACK_API_KEY", default_value = "")]
    api_key: String,

    /// Secret key used to sign requests
    #[arg(long, env = "CLOUDSTACK_SECRET_KEY", default_value = "", hide_env_values = true)]
    secret_key: String,

    /// Seconds to wait for async jobs
    #[arg(long, env = "CLOUDSTACK_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Maximum attempts when attaching a NIC
    #[arg(long, default_value_t = DEFAULT_ATTACH_ATTEMPTS)]
    attach_attempts: u32,

    /// CloudStack error code to treat as transient when attaching (repeatable)
    #[arg(long = "retry-error-code")]
    retry_error_codes: Vec<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the schema of a resource or data source
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },

    /// Manage a unique NIC
    Nic {
        #[command(subcommand)]
        command: NicCommands,
    },

    /// Read the configuration of a Kubernetes cluster
    ClusterConfig {
        /// Cluster ID
        #[arg(long)]
        id: String,

        /// Print config_data instead of redacting it
        #[arg(long)]
        show_sensitive: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NicCommands {
    /// Ensure the VM has exactly one NIC on the network
    Create {
        #[arg(long)]
        network_id: String,

        #[arg(long)]
        virtual_machine_id: String,

        /// Static IP address (assigned by the network if omitted)
        #[arg(long)]
        ip_address: Option<String>,
    },

    /// Refresh NIC state; prints null if the NIC is gone
    Read {
        /// NIC ID
        #[arg(long)]
        id: String,

        #[arg(long)]
        virtual_machine_id: String,
    },

    /// Detach the NIC
    Delete {
        /// NIC ID
        #[arg(long)]
        id: String,

        #[arg(long)]
        virtual_machine_id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SchemaKind {
    UniqueNic,
    KubernetesClusterConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudstack_provider=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match &args.command {
        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::UniqueNic => unique_nic_schema(),
                SchemaKind::KubernetesClusterConfig => kubernetes_cluster_config_schema(),
            };
            print_json(&schema)?;
        }
        Commands::Nic { command } => {
            let nic = UniqueNic::new(connect(&args)?).with_retry(
                RetryConfig::with_max_attempts(args.attach_attempts),
                retry_policy(&args),
            );
            run_nic(&nic, command).await?;
        }
        Commands::ClusterConfig { id, show_sensitive } => {
            let source = KubernetesClusterConfigSource::new(connect(&args)?);
            let state = source.read(&ClusterConfigQuery { id: id.clone() }).await?;
            let value = serde_json::to_value(&state)?;
            if *show_sensitive {
                print_json(&value)?;
            } else {
                print_json(&kubernetes_cluster_config_schema().redact(value))?;
            }
        }
    }

    Ok(())
}

async fn run_nic(nic: &UniqueNic, command: &NicCommands) -> Result<()> {
    match command {
        NicCommands::Create {
            network_id,
            virtual_machine_id,
            ip_address,
        } => {
            let config = UniqueNicConfig {
                network_id: network_id.clone(),
                ip_address: ip_address.clone(),
                virtual_machine_id: virtual_machine_id.clone(),
            };
            let state = nic.create(&config).await?;
            info!(nic_id = %state.id, "NIC ready");
            print_json(&state)?;
        }
        NicCommands::Read {
            id,
            virtual_machine_id,
        } => {
            let state = nic_state(id, virtual_machine_id);
            print_json(&nic.read(&state).await?)?;
        }
        NicCommands::Delete {
            id,
            virtual_machine_id,
        } => {
            nic.delete(&nic_state(id, virtual_machine_id)).await?;
            info!(nic_id = %id, "NIC deleted");
        }
    }
    Ok(())
}

/// State known before a read or delete: only the identity matters.
fn nic_state(id: &str, virtual_machine_id: &str) -> UniqueNicState {
    UniqueNicState {
        id: id.to_string(),
        network_id: String::new(),
        ip_address: None,
        virtual_machine_id: virtual_machine_id.to_string(),
    }
}

fn connect(args: &Args) -> Result<Arc<HttpClient>> {
    let config = ProviderConfig::new(&args.api_url, &args.api_key, &args.secret_key)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_verify_ssl(!args.insecure);
    info!("CloudStack API endpoint: {}", config.api_url);
    Ok(Arc::new(HttpClient::new(config)?))
}

fn retry_policy(args: &Args) -> RetryPolicy {
    if args.retry_error_codes.is_empty() {
        RetryPolicy::transient()
    } else {
        RetryPolicy::error_codes(args.retry_error_codes.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
