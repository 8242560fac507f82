//! Almanac Server Entry Point
//!
//! Reads JSON-RPC requests from stdin and writes responses to stdout. Logs go
//! to stderr. The periodic reflection scheduler runs until stdin closes.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use almanac_server::rpc::StdioTransport;
use almanac_server::{AlmanacConfig, MemoryService, RpcServer};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Almanac memory service over stdio JSON-RPC")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Do not start the periodic reflection scheduler
    #[arg(long)]
    no_scheduler: bool,

    /// Seed for reflection randomness (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AlmanacConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AlmanacConfig::default(),
    };
    if args.seed.is_some() {
        config.scheduler.seed = args.seed;
    }
    if args.no_scheduler {
        config.scheduler.enabled = false;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Almanac server");

    let service = Arc::new(MemoryService::new(&config));
    let token = CancellationToken::new();
    let scheduler = if config.scheduler.enabled {
        Some(service.spawn_scheduler(token.clone()))
    } else {
        tracing::info!("Reflection scheduler disabled");
        None
    };

    let server = RpcServer::new(Arc::clone(&service));
    let mut transport = StdioTransport::stdio();
    let served = server.run(&mut transport).await;

    token.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::error!("Reflection scheduler task failed: {}", e);
        }
    }

    served.context("JSON-RPC server error")?;
    tracing::info!("Almanac server stopped");
    Ok(())
}
