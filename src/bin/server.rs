//! Sentrytrade Server - headless control plane
//!
//! Runs the signal monitor, exchange sync, and SL/TP checker loops with no
//! HTTP server and no incoming connections. Metrics are pushed via
//! structured JSON logs to stdout.
//!
//! # Environment Variables
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Interval in seconds between metric outputs (default: 60)

use anyhow::Result;
use sentrytrade::application::system::Application;
use sentrytrade::config::Config;
use sentrytrade::infrastructure::observability::{Metrics, MetricsReporter};
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("sentrytrade-server {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(live_trading = config.live_trading, "configuration loaded");

    let app = Application::build(config).await?;
    let _handles = app.start();
    info!("scheduler loops running");

    let observability_enabled = std::env::var("OBSERVABILITY_ENABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);

    if observability_enabled {
        let metrics = Metrics::new()?;
        let interval = std::env::var("OBSERVABILITY_INTERVAL")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .unwrap_or(60);
        let reporter = MetricsReporter::new(app.order_store.clone(), metrics, interval);
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(interval, "metrics reporter started");
    } else {
        info!("metrics reporting disabled");
    }

    info!("server running; press Ctrl+C to shut down");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");

    Ok(())
}
