//! Push-based metrics reporter: periodically outputs a structured JSON
//! snapshot to stdout. No HTTP server, no incoming connections.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::application::order_store::OrderStore;
use crate::domain::trading::types::OrderStatus;
use crate::infrastructure::observability::metrics::Metrics;

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub open_orders: usize,
    pub filled_orders_recent: usize,
}

pub struct MetricsReporter {
    order_store: Arc<dyn OrderStore>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(order_store: Arc<dyn OrderStore>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            order_store,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting");
        loop {
            tokio::time::sleep(self.interval).await;
            match self.collect_snapshot().await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => println!("METRICS_JSON:{json}"),
                    Err(e) => warn!("failed to serialize metrics: {e}"),
                },
                Err(e) => warn!("failed to collect metrics: {e}"),
            }
            tracing::debug!(prometheus = %self.metrics.render(), "metrics tick");
        }
    }

    async fn collect_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let uptime = self.start_time.elapsed().as_secs();

        let open = self
            .order_store
            .find_all_by_status(&[OrderStatus::New, OrderStatus::Active, OrderStatus::PartiallyFilled])
            .await?;
        let filled = self
            .order_store
            .find_all_by_status(&[OrderStatus::Filled])
            .await?;

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            open_orders: open.len(),
            filled_orders_recent: filled.len(),
        })
    }
}
