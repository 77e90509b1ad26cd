//! Handler process (v1)
//!
//! Connects to an upstream proxy over message channels and serves its
//! requests through a regex route table.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌───────────────────────────────────────────────────────┐
//!                   │                   HANDLER PROCESS                     │
//!                   │                                                       │
//!    Proxy frames   │  ┌─────────┐    ┌─────────┐    ┌──────────────┐       │
//!    ───────────────┼─▶│   net   │───▶│  wire   │───▶│    http      │       │
//!                   │  │transport│    │ message │    │   request    │       │
//!                   │  └─────────┘    └─────────┘    └──────┬───────┘       │
//!                   │       ▲                               │               │
//!                   │       │                               ▼               │
//!    Reply frames   │  ┌─────────┐    ┌─────────┐    ┌──────────────┐       │
//!    ◀──────────────┼──│  wire   │◀───│  http   │◀───│   routing    │       │
//!                   │  │  reply  │    │response │    │  dispatcher  │       │
//!                   │  └─────────┘    └─────────┘    └──────────────┘       │
//!                   │                                                       │
//!                   │  ┌─────────────────────────────────────────────────┐  │
//!                   │  │ config (+watcher) · observability · lifecycle   │  │
//!                   │  └─────────────────────────────────────────────────┘  │
//!                   └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use handler_dispatch::config::{load_config, ConfigWatcher};
use handler_dispatch::lifecycle::{spawn_signal_handler, Shutdown};
use handler_dispatch::net::{ConnectionTracker, TcpTransport};
use handler_dispatch::observability::{init_logging, metrics};
use handler_dispatch::routing::{Dispatcher, HandlerRegistry, RouteTable};
use handler_dispatch::server::Server;
use handler_dispatch::views;

#[derive(Parser)]
#[command(name = "handler-dispatch")]
#[command(about = "Serve proxy requests through a regex route table", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "handler.toml")]
    config: PathBuf,

    /// Show handler errors and tested routes in error responses.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    config.server.debug |= cli.debug;

    init_logging(&config.observability)?;
    tracing::info!("handler-dispatch v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        config = %cli.config.display(),
        transports = config.transports.len(),
        routes = config.routes.len(),
        poll_timeout_ms = config.server.poll_timeout_ms,
        debug = config.server.debug,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let connections = ConnectionTracker::new();
    let mut registry = HandlerRegistry::new();
    views::register_builtin(&mut registry, connections.clone());

    let table = RouteTable::from_config(&config.routes, &registry)?.with_prefix(config.server.url_prefix.clone());
    let dispatcher = Dispatcher::new(table).with_debug(config.server.debug);

    let mut transports = Vec::with_capacity(config.transports.len());
    for transport in &config.transports {
        transports.push(TcpTransport::connect(transport).await?);
    }

    let (watcher, route_updates) = ConfigWatcher::new(&cli.config);
    let reloader = watcher.clone();
    let _file_watch = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config file watching disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone(), move || reloader.reload());

    Server::new(transports, dispatcher, shutdown)
        .with_poll_timeout(Duration::from_millis(config.server.poll_timeout_ms))
        .with_connections(connections)
        .with_route_reload(registry, config.server.url_prefix.clone(), route_updates)
        .run()
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
