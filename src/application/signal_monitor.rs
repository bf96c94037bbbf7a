//! C9 SignalMonitor (`spec.md` §4.9): the periodic per-symbol tick that turns
//! indicator readings into alerts and (when enabled) automatic BUY orders.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::application::audit_log::{AuditLog, SignalEventRecord};
use crate::application::order_store::OrderStore;
use crate::application::protective_order_engine::ProtectiveOrderEngine;
use crate::application::watchlist_store::WatchlistStore;
use crate::domain::alerts::AlertThrottler;
use crate::domain::guardrails::{GuardrailContext, GuardrailPipeline, PlacementKind, PortfolioSnapshot};
use crate::domain::trading::locks::{creation_lock_set, ExpiringLockSet};
use crate::domain::trading::types::{
    base_of, Order, OrderSide, OrderSource, OrderStatus, OrderType, Signal, SignalState,
    WatchlistItem,
};
use crate::infrastructure::exchange::{ExchangeClient, OrderSize};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::price_feed::{PriceFetcher, SignalClassifier};

/// G2's cooldown window (`spec.md` §4.7: "no BUY order for `symbol` within
/// the last 5 min").
const RECENT_ORDER_COOLDOWN_MS: i64 = 300_000;

pub struct SignalMonitor {
    watchlist_store: Arc<dyn WatchlistStore>,
    order_store: Arc<dyn OrderStore>,
    exchange: Arc<dyn ExchangeClient>,
    price_feed: Arc<dyn PriceFetcher>,
    classifier: Arc<dyn SignalClassifier>,
    notifier: Arc<dyn Notifier>,
    audit_log: Arc<dyn AuditLog>,
    protective_order_engine: Arc<ProtectiveOrderEngine>,
    throttler: Arc<AlertThrottler>,
    creation_locks: ExpiringLockSet<String>,
    signal_states: Mutex<HashMap<String, SignalState>>,
    max_open_per_symbol: u32,
    max_open_global: u32,
}

impl SignalMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        watchlist_store: Arc<dyn WatchlistStore>,
        order_store: Arc<dyn OrderStore>,
        exchange: Arc<dyn ExchangeClient>,
        price_feed: Arc<dyn PriceFetcher>,
        classifier: Arc<dyn SignalClassifier>,
        notifier: Arc<dyn Notifier>,
        audit_log: Arc<dyn AuditLog>,
        protective_order_engine: Arc<ProtectiveOrderEngine>,
        throttler: Arc<AlertThrottler>,
        max_open_per_symbol: u32,
        max_open_global: u32,
    ) -> Self {
        Self {
            watchlist_store,
            order_store,
            exchange,
            price_feed,
            classifier,
            notifier,
            audit_log,
            protective_order_engine,
            throttler,
            creation_locks: creation_lock_set(),
            signal_states: Mutex::new(HashMap::new()),
            max_open_per_symbol,
            max_open_global,
        }
    }

    pub async fn tick(&self) {
        // Step 1: alert-enabled, not-deleted watchlist items, read fresh.
        let items = match self.watchlist_store.list_active().await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "failed to load watchlist for signal monitor tick");
                return;
            }
        };

        for item in items.into_iter().filter(|i| i.alert_enabled && !i.is_deleted) {
            self.evaluate_symbol(&item).await;
        }
    }

    async fn evaluate_symbol(&self, item: &WatchlistItem) {
        let indicators = match self.price_feed.get_price_with_indicators(&item.symbol, "1h").await {
            Ok(reading) => reading,
            Err(err) => {
                error!(symbol = %item.symbol, error = %err, "price feed unavailable");
                return;
            }
        };

        let signal = self.classifier.classify(&indicators, item);
        let now = Utc::now().timestamp_millis();

        let prior_state = {
            let states = self.signal_states.lock().await;
            states.get(&item.symbol).cloned()
        };
        let is_first_signal = prior_state.is_none();
        let is_new_buy_transition =
            signal == Signal::Buy && prior_state.as_ref().map(|s| s.state) != Some(Signal::Buy);
        let prior_last_order_price = prior_state.as_ref().and_then(|s| s.last_order_price);

        match signal {
            Signal::Buy => {
                self.handle_buy(
                    item,
                    indicators.price,
                    now,
                    is_first_signal || is_new_buy_transition,
                    prior_last_order_price,
                )
                .await
            }
            Signal::Sell | Signal::Wait => {}
        }

        let mut states = self.signal_states.lock().await;
        let new_state = SignalState {
            state: signal,
            last_order_price: prior_state.and_then(|s| s.last_order_price),
            orders_count: states.get(&item.symbol).map(|s| s.orders_count).unwrap_or(0),
            timestamp: now,
        };
        states.insert(item.symbol.clone(), new_state);
        drop(states);

        let _ = self
            .audit_log
            .record_signal_event(SignalEventRecord {
                symbol: item.symbol.clone(),
                side: OrderSide::Buy,
                state: signal,
                last_order_price: None,
                orders_count: 0,
                timestamp: now,
            })
            .await;
    }

    async fn handle_buy(
        &self,
        item: &WatchlistItem,
        current_price: Decimal,
        now: i64,
        eligible_for_alert: bool,
        prior_last_order_price: Option<Decimal>,
    ) {
        if !eligible_for_alert {
            return;
        }

        if !self.throttler.try_acquire_send_lock(&item.symbol, OrderSide::Buy).await {
            return;
        }

        let snapshot = self.build_portfolio_snapshot(item, current_price, now).await;

        // Portfolio-value cap (G6): silent skip (no Telegram noise) when exceeded.
        let cap = item.trade_amount_usd * Decimal::from(3);
        if snapshot.portfolio_value_for_symbol > cap {
            self.throttler.release_send_lock(&item.symbol, OrderSide::Buy).await;
            return;
        }

        let decision = self
            .throttler
            .should_send(&item.symbol, OrderSide::Buy, current_price, item.trade_enabled, item.min_price_change_pct, now)
            .await;

        if decision.should_send {
            self.throttler.commit(&item.symbol, OrderSide::Buy, current_price, now).await;
            let _ = self
                .notifier
                .send_message(
                    &format!("BUY signal for {} at {}", item.symbol, current_price),
                    None,
                    Some(&item.symbol),
                )
                .await;
        }
        self.throttler.release_send_lock(&item.symbol, OrderSide::Buy).await;

        if !item.trade_enabled {
            return;
        }

        if !self.creation_locks.try_acquire(item.symbol.clone()).await {
            return;
        }

        let cooldown_cutoff = now - RECENT_ORDER_COOLDOWN_MS;
        let has_recent_buy_within_cooldown = self
            .order_store
            .find_recent_buys(&item.symbol, cooldown_cutoff)
            .await
            .map(|buys| !buys.is_empty())
            .unwrap_or(false);

        let ctx = GuardrailContext {
            watchlist_item: item,
            current_price,
            current_time_ms: now,
            snapshot: &snapshot,
            has_recent_buy_within_cooldown,
            last_order_price: prior_last_order_price,
            // We just acquired this lock ourselves above; G1 only blocks when
            // some other in-flight placement already holds it.
            creation_lock_held: false,
            margin_locked_609: self.protective_order_engine.is_margin_locked(&item.symbol).await,
            live_trading: true,
            max_open_per_symbol: self.max_open_per_symbol,
            max_open_global: self.max_open_global,
            max_snapshot_age_ms: 60_000,
            recent_order_cooldown_ms: RECENT_ORDER_COOLDOWN_MS,
        };

        let pipeline = GuardrailPipeline::standard();
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        if !decision.allowed {
            info!(symbol = %item.symbol, reason = ?decision.reason, "guardrails blocked entry");
            self.creation_locks.release(&item.symbol.to_string()).await;
            return;
        }

        let is_margin = decision.suggested_mode == crate::domain::guardrails::TradeMode::Margin;
        match self
            .exchange
            .place_market_order(&item.symbol, OrderSide::Buy, OrderSize::NotionalUsd(item.trade_amount_usd), is_margin, None)
            .await
        {
            Ok(placed) => {
                let order = Order {
                    exchange_order_id: placed.exchange_order_id,
                    client_oid: format!("signal_{}_{now}", item.symbol),
                    symbol: item.symbol.clone(),
                    side: OrderSide::Buy,
                    order_type: OrderType::Market,
                    order_role: None,
                    status: placed.status,
                    price: None,
                    trigger_price: None,
                    avg_price: placed.avg_price,
                    quantity: placed.cumulative_quantity.unwrap_or_default(),
                    cumulative_quantity: placed.cumulative_quantity.unwrap_or_default(),
                    cumulative_value: placed.avg_price.unwrap_or_default()
                        * placed.cumulative_quantity.unwrap_or_default(),
                    parent_order_id: None,
                    oco_group_id: None,
                    source: OrderSource::Auto,
                    exchange_create_time: now,
                    exchange_update_time: now,
                    created_at: now,
                    updated_at: now,
                };
                let _ = self.order_store.upsert(order).await;

                let mut states = self.signal_states.lock().await;
                if let Some(state) = states.get_mut(&item.symbol) {
                    state.last_order_price = Some(current_price);
                    state.orders_count += 1;
                }
            }
            Err(err) => {
                error!(symbol = %item.symbol, error = %err, "market buy placement failed");
            }
        }
        self.creation_locks.release(&item.symbol.to_string()).await;
    }

    /// Resolves `PortfolioSnapshot` from durable state (`OrderStore`, the
    /// exchange account summary) rather than trusted in-process memory, per
    /// `spec.md` §4.7/§9's field-scan priority-selection note. Open lot
    /// reconstruction mirrors `ExpectedTpEngine::rebuild_open_lots`'s FIFO
    /// consumption of filled sells against filled buys.
    async fn build_portfolio_snapshot(&self, item: &WatchlistItem, current_price: Decimal, now: i64) -> PortfolioSnapshot {
        let base = base_of(&item.symbol);
        let buys = self.order_store.filled_buys_in_fifo_order(base).await.unwrap_or_default();
        let sells = self.order_store.filled_sells_in_fifo_order(base).await.unwrap_or_default();

        let mut sell_residue: Vec<Decimal> = sells.iter().map(|s| s.cumulative_quantity).collect();
        let mut sell_idx = 0usize;
        let mut open_positions_for_base = 0u32;
        let mut open_qty = Decimal::ZERO;
        for buy in &buys {
            let mut remaining = buy.cumulative_quantity;
            while remaining > Decimal::ZERO && sell_idx < sell_residue.len() {
                let residue = sell_residue[sell_idx];
                if residue <= Decimal::ZERO {
                    sell_idx += 1;
                    continue;
                }
                let consumed = remaining.min(residue);
                remaining -= consumed;
                sell_residue[sell_idx] -= consumed;
                if sell_residue[sell_idx] <= Decimal::ZERO {
                    sell_idx += 1;
                }
            }
            if remaining > Decimal::ZERO {
                open_positions_for_base += 1;
                open_qty += remaining;
            }
        }

        let all_filled = self
            .order_store
            .find_all_by_status(&[OrderStatus::Filled])
            .await
            .unwrap_or_default();
        let total_buys = all_filled.iter().filter(|o| o.side == OrderSide::Buy && o.is_entry()).count();
        let total_sells = all_filled.iter().filter(|o| o.side == OrderSide::Sell).count();
        let total_open_positions = total_buys.saturating_sub(total_sells) as u32;

        let available_balance_usd = match self.exchange.get_account_summary().await {
            Ok(summary) => summary
                .accounts
                .iter()
                .filter(|b| b.currency == "USD" || b.currency == "USDT")
                .map(|b| b.available)
                .sum(),
            Err(err) => {
                error!(symbol = %item.symbol, error = %err, "failed to fetch account summary for guardrail snapshot");
                Decimal::ZERO
            }
        };

        PortfolioSnapshot {
            as_of: now,
            open_positions_for_base,
            total_open_positions,
            portfolio_value_for_symbol: open_qty * current_price,
            available_balance_usd,
            daily_notional_placed_usd: Decimal::ZERO,
        }
    }
}
