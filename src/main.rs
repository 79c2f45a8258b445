//! DerivWebsocket - Main Entry Point
//!
//! Connects to the Deriv API, streams ticks for one symbol and trades the
//! enabled last-digit patterns until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deriv_websocket::config::load_config;
use deriv_websocket::{
    ConnectionConfig, Connector, DerivConnection, DerivTradePlacer, Orchestrator,
    OrchestratorConfig, OrderSettings, PatternType, WebSocketConnector,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, default_value = "pretty", value_parser = ["pretty", "json"])]
    log_format: String,

    /// Symbol to stream ticks for (e.g. R_100)
    #[arg(long)]
    symbol: Option<String>,

    /// Comma-separated list of patterns to trade (OddEven, MatchDiffer, OverUnder)
    #[arg(long, value_delimiter = ',')]
    patterns: Option<Vec<PatternType>>,
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(Some(args.config.as_str())).context("loading configuration")?;
    if let Some(symbol) = args.symbol {
        config.deriv.symbol = symbol;
    }
    if let Some(patterns) = args.patterns {
        config.engine.enabled_patterns = patterns;
    }
    if let Some(level) = args.log_level {
        config.settings.log_level = level;
    }
    config.validate().context("validating configuration")?;

    init_logging(&config.settings.log_level, &args.log_format)?;

    info!("Starting DerivWebsocket application");
    info!("Configuration file: {}", args.config);

    let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new());
    let connection = DerivConnection::new(ConnectionConfig::from_app_config(&config)?, connector.clone());
    let placer = DerivTradePlacer::new(OrderSettings::from_app_config(&config)?, connector);

    if let Err(e) = connection.connect().await {
        warn!("Initial connect failed, retrying in background: {}", e);
    }

    match config.deriv.api_token.as_deref() {
        Some(token) => {
            if let Err(e) = connection.authorize(token).await {
                error!("Authorization failed: {}", e);
            }
            if let Err(e) = connection.subscribe_to_ticks(&config.deriv.symbol).await {
                warn!("Tick subscription failed: {}", e);
            }
        }
        None => warn!("No API token configured (set DERIV_API_TOKEN); trading stays idle"),
    }

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(connection.clone()),
        Arc::new(placer),
        OrchestratorConfig::from_engine_config(&config.engine),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trading = tokio::spawn(orchestrator.clone().run(shutdown_rx));

    info!("Application initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    shutdown_tx.send(true).ok();
    if let Err(e) = trading.await {
        error!("Trading loop ended abnormally: {}", e);
    }
    connection.unsubscribe_from_ticks().await;
    connection.disconnect().await;

    let trades = orchestrator.trades().await;
    info!(trades = trades.len(), "Shutdown complete");

    Ok(())
}
