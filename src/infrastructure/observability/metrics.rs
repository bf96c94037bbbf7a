//! Prometheus metrics definitions for the control plane.
//!
//! All metrics use the `sentrytrade_` prefix and are read-only.

use prometheus::{
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
    CounterVec, Gauge, GaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Orders placed, by side and terminal status.
    pub orders_total: CounterVec,
    /// Alerts sent, by symbol and side.
    pub alerts_sent_total: CounterVec,
    /// Guardrail rejections, by gate name.
    pub guardrail_rejections_total: CounterVec,
    /// Currently open OCO groups per symbol.
    pub open_oco_groups: GenericGaugeVec<AtomicF64>,
    /// Symbols currently inside a 609 margin lockout.
    pub margin_lockouts_active: GenericGauge<AtomicF64>,
    /// ExchangeSync reconciliation passes completed.
    pub exchange_sync_ticks_total: CounterVec,
    /// Orders cancelled by ExchangeSync as stale.
    pub stale_orders_cancelled_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_total = CounterVec::new(
            Opts::new("sentrytrade_orders_total", "Orders placed by side and status"),
            &["side", "status"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let alerts_sent_total = CounterVec::new(
            Opts::new("sentrytrade_alerts_sent_total", "Alerts sent by symbol and side"),
            &["symbol", "side"],
        )?;
        registry.register(Box::new(alerts_sent_total.clone()))?;

        let guardrail_rejections_total = CounterVec::new(
            Opts::new("sentrytrade_guardrail_rejections_total", "Guardrail rejections by gate"),
            &["gate"],
        )?;
        registry.register(Box::new(guardrail_rejections_total.clone()))?;

        let open_oco_groups = GaugeVec::new(
            Opts::new("sentrytrade_open_oco_groups", "Open OCO groups per symbol"),
            &["symbol"],
        )?;
        registry.register(Box::new(open_oco_groups.clone()))?;

        let margin_lockouts_active = Gauge::with_opts(Opts::new(
            "sentrytrade_margin_lockouts_active",
            "Symbols currently inside a 609 margin lockout",
        ))?;
        registry.register(Box::new(margin_lockouts_active.clone()))?;

        let exchange_sync_ticks_total = CounterVec::new(
            Opts::new("sentrytrade_exchange_sync_ticks_total", "ExchangeSync reconciliation passes"),
            &["outcome"],
        )?;
        registry.register(Box::new(exchange_sync_ticks_total.clone()))?;

        let stale_orders_cancelled_total = CounterVec::new(
            Opts::new("sentrytrade_stale_orders_cancelled_total", "Orders cancelled as stale by symbol"),
            &["symbol"],
        )?;
        registry.register(Box::new(stale_orders_cancelled_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            orders_total,
            alerts_sent_total,
            guardrail_rejections_total,
            open_oco_groups,
            margin_lockouts_active,
            exchange_sync_ticks_total,
            stale_orders_cancelled_total,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn inc_orders(&self, side: &str, status: &str) {
        self.orders_total.with_label_values(&[side, status]).inc();
    }

    pub fn inc_alerts_sent(&self, symbol: &str, side: &str) {
        self.alerts_sent_total.with_label_values(&[symbol, side]).inc();
    }

    pub fn inc_guardrail_rejection(&self, gate: &str) {
        self.guardrail_rejections_total.with_label_values(&[gate]).inc();
    }

    pub fn set_open_oco_groups(&self, symbol: &str, count: f64) {
        self.open_oco_groups.with_label_values(&[symbol]).set(count);
    }

    pub fn inc_exchange_sync_tick(&self, outcome: &str) {
        self.exchange_sync_ticks_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_stale_order_cancelled(&self, symbol: &str) {
        self.stale_orders_cancelled_total.with_label_values(&[symbol]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_creation_renders_prefix() {
        let metrics = Metrics::new().expect("failed to create metrics");
        assert!(metrics.render().contains("sentrytrade_"));
    }

    #[test]
    fn order_counter_increments() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.inc_orders("BUY", "FILLED");
        metrics.inc_orders("SELL", "REJECTED");
        let output = metrics.render();
        assert!(output.contains("sentrytrade_orders_total"));
    }

    #[test]
    fn open_oco_groups_per_symbol() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.set_open_oco_groups("ADA_USDT", 2.0);
        let output = metrics.render();
        assert!(output.contains("ADA_USDT"));
    }
}
