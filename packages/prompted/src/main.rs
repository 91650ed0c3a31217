use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use prompted::AppState;
use prompted::config::{CliOverrides, FileConfig, PromptedConfig, load_config};

#[derive(Parser)]
#[command(name = "prompted")]
#[command(about = "Relay one prompt at a time between a requester and a responder")]
struct Cli {
    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Secret the responder must present (generated when unset)
    #[arg(long)]
    secret: Option<String>,

    /// Serve this directory at / instead of the built-in page
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long, default_value = "prompted.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "prompted=debug,prompt_hub=debug,tower_http=debug,info"
    } else {
        "prompted=info,prompt_hub=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let config = PromptedConfig::resolve(
        file_config,
        CliOverrides {
            host: cli.host,
            port: cli.port,
            secret: cli.secret,
            static_dir: cli.static_dir,
        },
    );

    if config.secret_generated {
        info!("No secret configured, generated one: {}", config.secret);
    }
    if let Some(dir) = &config.static_dir {
        info!("Serving static files from {}", dir.display());
    }

    let bind_addr = config.bind_addr();
    let state = AppState::new(config);

    let consumer_cancel = CancellationToken::new();
    let consumer = state.spawn_event_consumer(consumer_cancel.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("prompted listening on http://{}", actual_addr);
    info!("  GET|POST /prompt     - submit a prompt");
    info!("  GET|POST /heartbeat  - responder heartbeat");
    info!("  GET|POST /respond    - answer the pending prompt");
    info!("  GET|POST /status     - current status");
    info!("  GET      /ws         - live status websocket");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(listener, prompted::app(state.clone()))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    // Upgraded websockets outlive the HTTP server; close them through the hub
    // so their receive loops finish.
    state.hub.shutdown().await;

    consumer_cancel.cancel();
    if let Some(consumer) = consumer {
        if let Err(e) = consumer.await {
            warn!("Event consumer ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    server_result
}
