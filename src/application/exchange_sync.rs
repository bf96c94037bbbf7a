//! C5 ExchangeSync (`spec.md` §4.5): periodic reconciliation between the
//! exchange's live order state and `OrderStore`. Driftable by design —
//! restarting with empty in-memory state converges within two ticks.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::application::order_store::OrderStore;
use crate::application::protective_order_engine::ProtectiveOrderEngine;
use crate::domain::trading::types::{Order, OrderStatus};
use crate::infrastructure::exchange::ExchangeClient;

/// Tracks, per `exchange_order_id`, how many consecutive ticks an active
/// local order has gone missing from the exchange's live listing
/// (`spec.md` §4.5 step 3: two consecutive misses -> stale cancel).
pub struct ExchangeSync {
    order_store: Arc<dyn OrderStore>,
    exchange: Arc<dyn ExchangeClient>,
    protective_order_engine: Arc<ProtectiveOrderEngine>,
    miss_counts: Mutex<HashMap<String, u32>>,
    last_status: Mutex<HashMap<String, OrderStatus>>,
}

impl ExchangeSync {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        exchange: Arc<dyn ExchangeClient>,
        protective_order_engine: Arc<ProtectiveOrderEngine>,
    ) -> Self {
        Self {
            order_store,
            exchange,
            protective_order_engine,
            miss_counts: Mutex::new(HashMap::new()),
            last_status: Mutex::new(HashMap::new()),
        }
    }

    pub async fn tick(&self) {
        if let Err(err) = self.tick_fallible().await {
            error!(error = %err, "exchange sync tick failed");
        }
    }

    async fn tick_fallible(&self) -> Result<(), anyhow::Error> {
        // Step 1: fetch live open + trigger orders.
        let mut live = self.exchange.list_open_orders().await?;
        live.extend(self.exchange.list_trigger_orders().await?);
        let live_ids: std::collections::HashSet<String> =
            live.iter().map(|o| o.exchange_order_id.clone()).collect();

        // Step 2: upsert all.
        for order in &live {
            if let Some(prev) = self.record_transition(order).await
                && order.status == OrderStatus::Filled
                && prev != OrderStatus::Filled
            {
                info!(order_id = %order.exchange_order_id, from = ?prev, "entry transitioned to filled");
            }
            self.order_store.upsert(order.clone()).await?;
        }

        // Step 3: stale-order detection over whatever is locally active.
        let locally_active = self
            .order_store
            .find_all_by_status(&[OrderStatus::New, OrderStatus::Active, OrderStatus::PartiallyFilled])
            .await
            .unwrap_or_default();

        let mut misses = self.miss_counts.lock().await;
        for order in &locally_active {
            if live_ids.contains(&order.exchange_order_id) {
                misses.remove(&order.exchange_order_id);
                continue;
            }
            let count = misses.entry(order.exchange_order_id.clone()).or_insert(0);
            *count += 1;
            if *count >= 2 {
                let mut cancelled = order.clone();
                cancelled.status = OrderStatus::Cancelled;
                cancelled.updated_at = Utc::now().timestamp_millis();
                warn!(
                    order_id = %order.exchange_order_id,
                    "marking order cancelled: stale_not_on_exchange"
                );
                self.order_store.upsert(cancelled).await?;
                misses.remove(&order.exchange_order_id);
            }
        }
        drop(misses);

        // Step 4: invoke ProtectiveOrderEngine for newly filled entries
        // lacking protective children.
        for order in &live {
            if order.status != OrderStatus::Filled || order.is_protective() {
                continue;
            }
            let children = self.order_store.find_children(&order.exchange_order_id).await?;
            if children.is_empty() {
                match self.protective_order_engine.create_for_filled(order).await {
                    Ok(outcome) => info!(order_id = %order.exchange_order_id, ?outcome, "protective order engine result"),
                    Err(err) => error!(order_id = %order.exchange_order_id, error = %err, "protective order engine failed"),
                }
            }
        }

        // Step 5: paged order history for terminal-state accuracy.
        let history = self.exchange.list_order_history(100, 5).await?;
        for order in history {
            if order.status.is_terminal() {
                self.order_store.upsert(order).await?;
            }
        }

        Ok(())
    }

    /// Records `order`'s current status, returning whatever status was
    /// recorded for it last cycle (`None` the first time it's observed).
    async fn record_transition(&self, order: &Order) -> Option<OrderStatus> {
        let mut last_status = self.last_status.lock().await;
        last_status.insert(order.exchange_order_id.clone(), order.status)
    }
}
