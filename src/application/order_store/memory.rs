//! In-memory `OrderStore` test double. Mirrors the duplicate-suppression and
//! FIFO-ordering semantics of `SqliteOrderStore` without touching a database.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::application::order_store::trait_def::{
    now_ms, OrderStore, OrderStoreError, DUPLICATE_SUPPRESSION_WINDOW_MS,
};
use crate::domain::trading::types::{same_base, Order, OrderStatus};

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_duplicate(existing: &Order, incoming: &Order) -> bool {
        existing.symbol == incoming.symbol
            && existing.side == incoming.side
            && existing.order_role == incoming.order_role
            && existing.price == incoming.price
            && existing.quantity == incoming.quantity
            && now_ms() - existing.updated_at < DUPLICATE_SUPPRESSION_WINDOW_MS
    }

    fn matches_base(order: &Order, symbol_or_base: &str) -> bool {
        order.symbol == symbol_or_base || same_base(&order.symbol, symbol_or_base)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert(&self, mut order: Order) -> Result<(), OrderStoreError> {
        let mut orders = self.orders.write().await;

        if let Some(existing) = orders.get(&order.exchange_order_id) {
            if existing.exchange_order_id != order.exchange_order_id && Self::is_duplicate(existing, &order) {
                return Ok(());
            }
            if order.parent_order_id.is_none() {
                order.parent_order_id = existing.parent_order_id.clone();
            }
            if order.oco_group_id.is_none() {
                order.oco_group_id = existing.oco_group_id.clone();
            }
            // `order_role` is set once at placement time and never cleared by
            // a later reconciliation upsert (mirrors `SqliteOrderStore`, which
            // omits the column from its `ON CONFLICT DO UPDATE SET` clause).
            if order.order_role.is_none() {
                order.order_role = existing.order_role;
            }
        } else if let Some(duplicate) = orders
            .values()
            .find(|existing| Self::is_duplicate(existing, &order))
        {
            let _ = duplicate;
            return Ok(());
        }

        orders.insert(order.exchange_order_id.clone(), order);
        Ok(())
    }

    async fn find_by_status(
        &self,
        symbol_or_base: &str,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| Self::matches_base(o, symbol_or_base) && statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn find_all_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn find_recent_buys(
        &self,
        symbol_or_base: &str,
        since: i64,
    ) -> Result<Vec<Order>, OrderStoreError> {
        use crate::domain::trading::types::OrderSide;
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| {
                Self::matches_base(o, symbol_or_base)
                    && o.side == OrderSide::Buy
                    && o.exchange_create_time >= since
            })
            .cloned()
            .collect())
    }

    async fn find_siblings_in_oco(&self, oco_group_id: &str) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.oco_group_id.as_deref() == Some(oco_group_id))
            .cloned()
            .collect())
    }

    async fn find_children(&self, parent_order_id: &str) -> Result<Vec<Order>, OrderStoreError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.parent_order_id.as_deref() == Some(parent_order_id))
            .cloned()
            .collect())
    }

    async fn filled_buys_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError> {
        use crate::domain::trading::types::OrderSide;
        let mut filled: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                Self::matches_base(o, symbol_or_base)
                    && o.side == OrderSide::Buy
                    && o.status == OrderStatus::Filled
            })
            .cloned()
            .collect();
        filled.sort_by_key(|o| o.exchange_create_time);
        Ok(filled)
    }

    async fn filled_sells_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError> {
        use crate::domain::trading::types::OrderSide;
        let mut filled: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                Self::matches_base(o, symbol_or_base)
                    && o.side == OrderSide::Sell
                    && o.status == OrderStatus::Filled
            })
            .cloned()
            .collect();
        filled.sort_by_key(|o| o.exchange_create_time);
        Ok(filled)
    }
}
