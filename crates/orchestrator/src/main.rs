use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use minutes_orchestrator::{config::Config, engine::WorkflowEngine, server::Server};

/// Workflow orchestrator for the meeting minutes pipeline
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Listen address, overrides SERVER_ADDR
    #[arg(long)]
    addr: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let mut config = Config::load()?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    info!("Loaded configuration: {:?}", config);

    // Initialize engine
    let engine = Arc::new(WorkflowEngine::from_config(&config)?);
    info!(
        "Pipeline has {} steps, retry policy {:?}",
        engine.registry().len(),
        config.pipeline.retry
    );

    // Start server
    info!("Starting server on {}", config.server.addr);
    Server::new(engine).start(&config.server.addr).await?;

    Ok(())
}
