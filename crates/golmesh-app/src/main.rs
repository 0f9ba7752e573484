use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use golmesh_app::{
    ControlHandle, ControlServerConfig, Coordinator, CoordinatorConfig, HttpPoolConfig,
    HttpWorkerPool, InProcessWorkerPool, WorkerAddresses, WorkerPool, serve,
};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "golmesh-broker",
    version,
    about = "Coordinate a distributed Game of Life run across golmesh workers"
)]
struct Cli {
    /// Port for the REST control API.
    #[arg(long, env = "GOLMESH_BROKER_PORT", default_value_t = 12345)]
    port: u16,

    /// Host running the workers when they are addressed sequentially.
    #[arg(long, env = "GOLMESH_WORKER_HOST", default_value = "127.0.0.1")]
    worker_host: String,

    /// Port of worker 0; worker `i` listens on `base + i`.
    #[arg(long, env = "GOLMESH_WORKER_BASE_PORT", default_value_t = 12346)]
    worker_base_port: u16,

    /// Explicit worker address (`host:port`), one per partition. Repeatable.
    #[arg(long = "worker-addr", value_name = "HOST:PORT")]
    worker_addrs: Vec<String>,

    /// Run workers inside the broker process instead of over HTTP.
    #[arg(long, conflicts_with = "worker_addrs")]
    embedded_workers: bool,

    /// Worker count to terminate on quit when no run has started.
    #[arg(long, default_value_t = 4)]
    default_workers: usize,

    /// Bound on each worker's terminate acknowledgement.
    #[arg(long, default_value_t = 400)]
    terminate_timeout_ms: u64,

    /// Most dispatch threads a run uses; larger worker counts share them.
    #[arg(long, default_value_t = 64)]
    max_dispatch_threads: usize,

    /// Bound on each slice call; unbounded when omitted.
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if cli.default_workers == 0 {
        bail!("--default-workers must be at least 1");
    }
    if cli.max_dispatch_threads == 0 {
        bail!("--max-dispatch-threads must be at least 1");
    }

    let pool: Arc<dyn WorkerPool> = if cli.embedded_workers {
        info!("using embedded workers");
        Arc::new(InProcessWorkerPool::new())
    } else {
        let addresses = if cli.worker_addrs.is_empty() {
            WorkerAddresses::Sequential {
                host: cli.worker_host.clone(),
                base_port: cli.worker_base_port,
            }
        } else {
            WorkerAddresses::Explicit(cli.worker_addrs.clone())
        };
        info!(?addresses, "using HTTP workers");
        Arc::new(HttpWorkerPool::new(HttpPoolConfig {
            addresses,
            request_timeout: cli.request_timeout_ms.map(Duration::from_millis),
            ..HttpPoolConfig::default()
        }))
    };

    let coordinator = Arc::new(Coordinator::new(
        pool,
        CoordinatorConfig {
            default_workers: cli.default_workers,
            terminate_timeout: Duration::from_millis(cli.terminate_timeout_ms),
            max_dispatch_threads: cli.max_dispatch_threads,
        },
    ));

    let config = ControlServerConfig {
        rest_address: SocketAddr::from(([0, 0, 0, 0], cli.port)),
    };
    let listener = TcpListener::bind(config.rest_address)
        .await
        .with_context(|| format!("failed to bind control API on {}", config.rest_address))?;
    serve(listener, ControlHandle::new(coordinator)).await?;
    info!("broker stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
