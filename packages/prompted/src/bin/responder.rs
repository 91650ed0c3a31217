use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use prompted::responder::{DEFAULT_PREFIX, Responder, ResponderConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "prompted-responder")]
#[command(about = "Answer prompts from a prompted server by echoing them back")]
struct Cli {
    /// Base URL of the prompted server
    #[arg(short, long, default_value = "http://localhost:8182")]
    server: String,

    /// Shared secret configured on the server
    #[arg(long, default_value = "8181")]
    secret: String,

    /// Seconds between status polls
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Text prepended to every answer
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Send working/ready heartbeats around each answer
    #[arg(long)]
    heartbeat: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "prompted=debug,info"
    } else {
        "prompted=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let responder = Responder::new(ResponderConfig {
        server: cli.server.clone(),
        secret: cli.secret,
        prefix: cli.prefix,
        interval: Duration::from_secs(cli.interval.max(1)),
        heartbeat: cli.heartbeat,
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
        }
        on_signal.cancel();
    });

    info!("responding to prompts from {}", cli.server);
    responder.run(cancel).await;
    info!("responder stopped");
    Ok(())
}
