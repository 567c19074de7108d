//! Bridge Daemon - HTTP front end for the Ollama event bridge
//!
//! Serves the chat endpoint that turns an Ollama NDJSON stream into the UI
//! message-stream protocol, running tool calls in between.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:8080, Ollama at localhost:11434)
//! bridge-daemon
//!
//! # Remote Ollama, custom listen address
//! bridge-daemon --ollama-url http://gpu-box:11434 --bind 0.0.0.0:3000
//!
//! # With config file
//! bridge-daemon --config ~/.config/ollama-bridge/bridge.toml
//!
//! # Verbose logging
//! RUST_LOG=debug bridge-daemon
//! ```
//!
//! # Endpoints
//!
//! - `POST /api/chat`: stream one turn as server-sent events
//! - `GET /api/models`: models installed on the backend
//! - `GET /health`: backend reachability
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod api;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use bridge_core::backend::LlmBackend;
use bridge_core::{
    default_config_path, load_config_from_path, ConfigOverrides, EventSequencer, OllamaBackend,
    SequencerConfig, ToolRegistry,
};

use server::AppState;

/// Bridge Daemon - streams Ollama chat turns to a browser chat UI
#[derive(Parser, Debug)]
#[command(name = "bridge-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "BRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ollama base URL
    #[arg(long, value_name = "URL")]
    ollama_url: Option<String>,

    /// Model used when a request names none
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("bridge_daemon={level},bridge_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolve when SIGTERM or SIGINT arrives
async fn shutdown_signal() {
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());

    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install signal handlers, falling back to Ctrl-C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl-C, initiating shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Bridge daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config =
        load_config_from_path(config_path).context("Failed to load configuration")?;

    let overrides = ConfigOverrides {
        bind: args.bind,
        ollama_url: args.ollama_url,
        default_model: args.model,
    };
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    if let Some(ref path) = config.config_file_path {
        info!(config_path = ?path, "Config file");
    }
    info!(
        source = ?config.source(),
        backend = %config.backend.base_url,
        default_model = %config.chat.default_model,
        max_steps = config.chat.max_steps,
        "Configuration loaded"
    );

    let backend =
        OllamaBackend::from_config(&config.backend).context("Failed to create Ollama backend")?;
    if backend.health_check().await {
        info!(url = %backend.base_url(), "Ollama is reachable");
    } else {
        warn!(url = %backend.base_url(), "Ollama is not reachable; requests will fail until it is");
    }

    let tools = ToolRegistry::builtin(&config.tools).context("Failed to set up tools")?;
    let sequencer = EventSequencer::new(
        Arc::new(backend),
        tools,
        config.sampling.clone(),
        SequencerConfig::from(&config.chat),
    );

    let app = server::router(Arc::new(AppState { sequencer }));

    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    match result {
        Ok(()) => {
            info!("Bridge daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
