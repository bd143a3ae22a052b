//! Deployment hooks for identity-provider provisioning.
//!
//! Two entry points invoked as separate steps of the deployment pipeline:
//!
//! - `preprovision` runs before infrastructure creation. It establishes the
//!   identity client (or produces the realm-import document) and writes the
//!   resulting client ID - and, on first creation only, the client secret -
//!   to the configured env file.
//! - `postprovision` runs after infrastructure creation, once the deployed
//!   service has a stable address, and registers that address's OAuth
//!   callback with the identity provider.
//!
//! Both commands are idempotent and safe to re-run on deployment retries: a
//! rerun finds the existing registration, verifies it, and exits cleanly.
//!
//! ## Usage
//!
//! ```bash
//! # Before infrastructure creation
//! MCP_AUTH_PROVIDER=entra_proxy AZURE_TENANT_ID=... GRAPH_ACCESS_TOKEN=... \
//!   idprov-hooks preprovision
//!
//! # After infrastructure creation
//! idprov-hooks postprovision --server-url https://mcp-server.example.net
//! ```
//!
//! ## Exit codes
//!
//! - 0: success, or clean skip (`MCP_AUTH_PROVIDER=none`)
//! - 1: configuration, timeout, or output error
//! - 2: provisioning or registration-conflict error
//! - 3: insufficient directory permissions

use clap::{Parser, Subcommand};
use idprov::{
    config::Config,
    errors::ProvisionError,
    provision::{
        BootstrapKind, DeployedServiceEndpoint, DotenvFileSink, ProvisionOrchestrator,
        provider_for,
    },
};
use std::process;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "idprov-hooks", about = "Identity-provider provisioning hooks")]
struct Cli {
    /// Override the env file produced credentials are written to
    #[arg(long)]
    env_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or reuse the identity client before infrastructure exists
    Preprovision,
    /// Register the deployed endpoint's OAuth callback once known
    Postprovision {
        /// Deployed server base URL (falls back to
        /// ENTRA_PROXY_MCP_SERVER_BASE_URL)
        #[arg(long)]
        server_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "idprov=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err
            .downcast_ref::<ProvisionError>()
            .map_or(1, ProvisionError::exit_code);
        tracing::error!("{err:#}");
        process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::new()?;
    let provider = provider_for(&config)?;
    let orchestrator = ProvisionOrchestrator::new(provider.clone());

    match cli.command {
        Command::Preprovision => {
            let env_file = cli.env_file.unwrap_or_else(|| config.provision_env_file.clone());
            let mut sink = DotenvFileSink::new(&env_file);
            let phase = orchestrator.preprovision(&mut sink).await?;
            tracing::info!(?phase, "preprovision finished");
        }
        Command::Postprovision { server_url } => {
            let raw_url = server_url.or_else(|| config.deployed_server_base_url.clone());
            match raw_url {
                Some(raw) => {
                    let endpoint = DeployedServiceEndpoint::new(&raw)?;
                    let phase = orchestrator.postprovision(&endpoint).await?;
                    tracing::info!(?phase, "postprovision finished");
                }
                // Providers without a runtime patch phase need no endpoint.
                None if provider.bootstrap_kind() != BootstrapKind::Imperative => {
                    tracing::info!(
                        mode = config.auth_provider_mode.as_str(),
                        "no deployed endpoint configured, nothing to patch"
                    );
                }
                None => {
                    anyhow::bail!(
                        "error-idprov-config-1 ENTRA_PROXY_MCP_SERVER_BASE_URL must be set \
                         (or pass --server-url)"
                    );
                }
            }
        }
    }

    Ok(())
}
