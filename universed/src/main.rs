//! Universe daemon.
//!
//! Serves a universe node over gRPC (and optionally JSON/HTTP), joins the
//! configured federation and keeps it in sync.
//!
//! Usage:
//!     universed --rpc-listen 127.0.0.1:10029
//!     universed --rest-listen 127.0.0.1:8089 --federation-server peer:10029 --sync-interval-secs 300

mod rest;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use universe_rpc::tracing::prefix::{PULSE_CLOSE, PULSE_OPEN};
use universe_rpc::{shutdown_signal, GrpcConnector, RpcServer, DEFAULT_RPC_PORT};
use universe_sync::{FederationConfig, NodeConfig, RetryPolicy, UniverseNode};

#[derive(Parser, Debug)]
#[command(name = "universed")]
#[command(about = "Universe commitment server with federation sync")]
#[command(version)]
struct Args {
    /// gRPC listen address
    #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_RPC_PORT)))]
    rpc_listen: SocketAddr,

    /// JSON/HTTP listen address (disabled when unset)
    #[arg(long)]
    rest_listen: Option<SocketAddr>,

    /// Federation member to push to and sync from (repeatable)
    #[arg(long = "federation-server")]
    federation_servers: Vec<String>,

    /// Seconds between federation pulls (disabled when unset)
    #[arg(long)]
    sync_interval_secs: Option<u64>,

    /// Attempts per peer for each push
    #[arg(long, default_value_t = RetryPolicy::default().max_attempts)]
    push_max_attempts: u32,

    /// Timeout of a single push attempt in seconds
    #[arg(long, default_value_t = RetryPolicy::default().push_timeout.as_secs())]
    push_timeout_secs: u64,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        NodeConfig {
            federation: FederationConfig {
                retry: RetryPolicy {
                    max_attempts: self.push_max_attempts.max(1),
                    push_timeout: Duration::from_secs(self.push_timeout_secs),
                    ..RetryPolicy::default()
                },
                sync_interval: self
                    .sync_interval_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                ..FederationConfig::default()
            },
            ..NodeConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    universe_rpc::tracing::init_with_filter(&args.log_level);

    info!("{} Starting universed {}", PULSE_OPEN, env!("CARGO_PKG_VERSION"));

    let node = UniverseNode::new(Arc::new(GrpcConnector::new()), args.node_config());
    for host in &args.federation_servers {
        if node.add_federation_server(host) {
            info!("Federation server {}", host);
        }
    }
    let ticker = node.spawn_periodic_sync();

    // One signal stops every listener.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let rest = match args.rest_listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            info!("{} Universe REST listening on {}", PULSE_OPEN, addr);
            let app = rest::router(node.clone());
            let stopped = stopped(stop_rx.clone());
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(stopped)
                    .await
            }))
        }
        None => None,
    };

    let served = RpcServer::new(node)
        .address(args.rpc_listen)
        .serve_with_shutdown(stopped(stop_rx))
        .await;

    if let Some(handle) = rest {
        match handle.await {
            Ok(Ok(())) => info!("{} Universe REST stopped", PULSE_CLOSE),
            Ok(Err(e)) => error!("REST server failed: {}", e),
            Err(e) => error!("REST server task failed: {}", e),
        }
    }
    if let Some(ticker) = ticker {
        ticker.abort();
    }

    served?;
    info!("{} Shutdown complete", PULSE_CLOSE);
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
