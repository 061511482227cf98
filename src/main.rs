//! Partner API Gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                   PARTNER GATEWAY                    │
//!                       │                                                      │
//!   Client Request      │  ┌────────┐   ┌────────┐   ┌────────┐   ┌─────────┐  │
//!   ────────────────────┼─▶│  auth  │──▶│  rate  │──▶│ access │──▶│forwarder│──┼──▶ Upstream
//!     X-API-Key         │  │        │   │ limit  │   │control │   │         │  │
//!                       │  └───┬────┘   └────────┘   └───┬────┘   └────┬────┘  │
//!                       │      │                         │             │       │
//!                       │      ▼                         ▼             ▼       │
//!                       │  ┌──────────────────────────────────┐   ┌─────────┐  │
//!                       │  │          partner store           │◀──│  usage  │  │
//!                       │  │  partners / permissions / usage  │   │recorder │  │
//!                       │  └──────────────────────────────────┘   └─────────┘  │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use partner_gateway::config::{load_config, GatewayConfig};
use partner_gateway::observability::{logging, metrics};
use partner_gateway::store::SqliteStore;
use partner_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "partner-gateway")]
#[command(about = "API-key gated reverse proxy for partner traffic", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!("partner-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        database = %config.store.database_url,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = SqliteStore::connect(&config.store).await?;
    store.init_schema().await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config, Arc::new(store))?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
