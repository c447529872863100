//! REST collection host (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────────┐
//!                     │                   COLLECTION HOST                      │
//!                     │                                                        │
//!   Client Request    │  ┌─────────┐   ┌────────────┐   ┌──────────────┐       │
//!   ──────────────────┼─▶│  http   │──▶│  dispatch  │──▶│   routing    │       │
//!                     │  │ server  │   │ middleware │   │ route table  │       │
//!                     │  └─────────┘   └─────┬──────┘   └──────────────┘       │
//!                     │                      │                                 │
//!                     │                      ▼                                 │
//!   Client Response   │  ┌─────────────┐   ┌──────────────┐                    │
//!   ◀─────────────────┼──│ negotiation │◀──│ collections  │◀── logic modules   │
//!                     │  │ formatters  │   │   handles    │                    │
//!                     │  └─────────────┘   └──────▲───────┘                    │
//!                     │                           │                            │
//!                     │                    ┌──────┴───────┐                    │
//!                     │   filesystem ─────▶│   watcher    │                    │
//!                     │                    │   reloader   │                    │
//!                     │                    └──────────────┘                    │
//!                     └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;

use collection_host::config::{load_config, HostConfig};
use collection_host::lifecycle::{wait_for_signal, Shutdown};
use collection_host::observability::{init_metrics, init_tracing};
use collection_host::CollectionHost;

#[derive(Parser)]
#[command(name = "collection-host")]
#[command(about = "Serve REST collections from a watched directory tree", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Disable hot reload.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HostConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if cli.no_watch {
        config.collections.watch = false;
    }

    init_tracing(&config.observability);
    tracing::info!("collection-host v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        root = ?config.collections.root,
        routes = config.routes.len(),
        watch = config.collections.watch,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => match init_metrics(addr) {
                Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
                Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
            },
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let host = CollectionHost::builder(config).build()?;
    host.ready();

    let shutdown = Shutdown::new();
    let reloader = host.watch(shutdown.subscribe())?;

    let listener = TcpListener::bind(&host.config().listener.bind_address).await?;
    let server = host.server();
    let server_shutdown = shutdown.subscribe();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal.trigger();
    });

    server.run(listener, server_shutdown).await?;

    host.close();
    if let Some(reloader) = reloader {
        let _ = reloader.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
