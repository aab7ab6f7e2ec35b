//! Load-balancing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                BALANCE PROXY                  │
//!                  │                                               │
//!  Client Request  │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!  ────────────────┼─▶│ axum   │──▶│ dispatch │──▶│  balancer  │  │
//!                  │  │ server │   │ handler  │   │ (strategy) │  │
//!                  │  └────────┘   └────┬─────┘   └─────┬──────┘  │
//!                  │                    │               │         │
//!                  │                    ▼               │         │
//!  Client Response │              ┌──────────┐         add/remove │
//!  ◀───────────────┼──────────────│forwarder │          │         │
//!                  │              └────┬─────┘   ┌──────┴──────┐  │     Backend
//!                  │                   └─────────┼─▶  health   │◀─┼──── probes
//!                  │                             │   monitor   │  │
//!                  │                             └─────────────┘  │
//!                  └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balance_proxy::config::load_config;
use balance_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "balance-proxy", about = "Load-balancing reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "balance_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("balance-proxy v0.1.0 starting");

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        algorithm = %config.balancer.algorithm,
        backends = config.backends.len(),
        health_interval_secs = config.health_check.interval_secs,
        max_inflight = config.listener.max_inflight,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => balance_proxy::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal.trigger();
        }
    });

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
