//! Cabinet RPC Server - Entry Point
//!
//! Opens the configured cabinet and serves it over JSON-RPC

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cabinet_rpc::{open_cabinet, serve, AppState, MethodRegistry, RpcServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "cabinet-rpc", version, about = "JSON-RPC server for a Cabinet secret store")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CABINET_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,
}

/// Initialize logging
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    info!("Cabinet RPC server starting...");

    let mut config = ServerConfig::load(cli.config.as_deref())
        .await
        .context("loading configuration")?;
    config.apply_env().context("reading CABINET_* environment")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate().context("invalid configuration")?;

    let cabinet = match open_cabinet(&config).await {
        Ok(cabinet) => cabinet,
        Err(e) => {
            error!("Failed to open cabinet {}: {}", config.vault_name, e);
            return Err(e.into());
        }
    };
    info!("Cabinet {} open", config.vault_name);

    let state = AppState::from_config(cabinet, &config);
    let registry = MethodRegistry::with_store_gated(config.gate_store_methods);
    let server = Arc::new(RpcServer::new(state.clone(), registry));

    let result = serve(server, &config.bind_address()).await;

    state.close().await;
    info!("Cabinet RPC server shutting down");

    result.context("serving RPC")
}
