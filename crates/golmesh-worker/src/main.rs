use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use golmesh_worker::{WorkerServerConfig, WorkerService, serve};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "golmesh-worker",
    version,
    about = "Compute Game of Life row slices on behalf of a golmesh broker"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "GOLMESH_WORKER_PORT", default_value_t = 12346)]
    port: u16,

    /// Interface to bind.
    #[arg(long, env = "GOLMESH_WORKER_BIND", default_value = "0.0.0.0")]
    host: IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = WorkerServerConfig {
        address: SocketAddr::new(cli.host, cli.port),
    };

    let listener = TcpListener::bind(config.address)
        .await
        .with_context(|| format!("failed to bind worker on {}", config.address))?;
    serve(listener, Arc::new(WorkerService::new())).await?;
    info!("worker stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
