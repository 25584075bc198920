//! Forecast Daemon - epoch-aligned forecast scheduling service
//!
//! The daemon provides:
//! - Control-plane handling of metric bounds, start and stop messages
//! - One scheduling loop per active application
//! - At-least-once publication of sanitized forecasts
//! - Liveness signalling and a status API

use clap::Parser;
use forecast_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Forecast Daemon CLI
#[derive(Parser)]
#[command(name = "forecastd")]
#[command(about = "Forecast Daemon - epoch-aligned forecast scheduling service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FORECAST_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "FORECAST_LISTEN_ADDR")]
    listen: Option<String>,

    /// Properties file shared with the forecasting executable
    #[arg(short, long, env = "FORECAST_PROPERTIES")]
    properties: Option<String>,

    /// Log level
    #[arg(long, env = "FORECAST_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FORECAST_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(properties) = &cli.properties {
        config.forecasting.properties_path = properties.into();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        method = %config.forecasting.method,
        listen = %config.server.listen_addr,
        properties = %config.forecasting.properties_path.display(),
        "Starting forecast daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
