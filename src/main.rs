//! Service gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ axum + tower-http layers ──▶ middleware chain ──▶ Router
//!                                                                 │
//!                         ┌───────────────────────────────────────┤
//!                         ▼                                       ▼
//!                  application routes               {root}/:service/*path
//!                  (e.g. /healthz)                           │
//!                                                            ▼
//!                                           Gateway ── ProviderCache (LRU)
//!                                              │
//!                                              ▼
//!                               naming / watch / gossip backends
//!                                              │
//!                                              ▼
//!                               WRR / smooth WRR ──▶ forward to instance
//! ```

use std::path::PathBuf;

use axum::body::Body;
use axum::http::Response;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service_gateway::config::loader::{load_config, load_from_env};
use service_gateway::config::watcher::ConfigWatcher;
use service_gateway::discovery::GossipMembership;
use service_gateway::http::route_fn;
use service_gateway::observability::{logging, metrics};
use service_gateway::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "service-gateway", version, about = "HTTP router and service-discovery gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults plus environment overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        gateway_enabled = config.gateway.enabled,
        discovery_modes = %config.gateway.discovery_modes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    // Hot reload only when a file is being watched.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let membership = GossipMembership::new(config.discovery.gossip.service_tag.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let mut builder = HttpServer::builder(config).gossip(membership);
    builder.router_mut().handle(
        "GET",
        "/healthz",
        route_fn(|_req, _params| async { Ok(Response::new(Body::from("ok"))) }),
        "healthz",
    )?;
    let server = builder.build()?;

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
