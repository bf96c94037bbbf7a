use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::application::order_store::trait_def::{now_ms, OrderStore, OrderStoreError};
use crate::domain::trading::types::{
    quote_variants, Order, OrderRole, OrderSide, OrderSource, OrderStatus, OrderType,
};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteOrderStore {
    database: Database,
}

impl SqliteOrderStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn map_err(context: &str, err: sqlx::Error) -> OrderStoreError {
        OrderStoreError::Backend(format!("{context}: {err}"))
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    exchange_order_id: String,
    client_oid: String,
    symbol: String,
    side: String,
    order_type: String,
    order_role: Option<String>,
    status: String,
    price: Option<String>,
    trigger_price: Option<String>,
    avg_price: Option<String>,
    quantity: String,
    cumulative_quantity: String,
    cumulative_value: String,
    parent_order_id: Option<String>,
    oco_group_id: Option<String>,
    source: String,
    exchange_create_time: i64,
    exchange_update_time: i64,
    created_at: i64,
    updated_at: i64,
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_default()
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderStoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let side = match row.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(OrderStoreError::Backend(format!("unknown side {other}"))),
        };
        let order_type = match row.order_type.as_str() {
            "MARKET" => OrderType::Market,
            "LIMIT" => OrderType::Limit,
            "STOP_LIMIT" => OrderType::StopLimit,
            "TAKE_PROFIT_LIMIT" => OrderType::TakeProfitLimit,
            other => return Err(OrderStoreError::Backend(format!("unknown order_type {other}"))),
        };
        let order_role = match row.order_role.as_deref() {
            Some("STOP_LOSS") => Some(OrderRole::StopLoss),
            Some("TAKE_PROFIT") => Some(OrderRole::TakeProfit),
            Some(other) => return Err(OrderStoreError::Backend(format!("unknown order_role {other}"))),
            None => None,
        };
        let status = match row.status.as_str() {
            "NEW" => OrderStatus::New,
            "ACTIVE" => OrderStatus::Active,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            other => return Err(OrderStoreError::Backend(format!("unknown status {other}"))),
        };
        let source = match row.source.as_str() {
            "auto" => OrderSource::Auto,
            "manual" => OrderSource::Manual,
            other => return Err(OrderStoreError::Backend(format!("unknown source {other}"))),
        };

        Ok(Order {
            exchange_order_id: row.exchange_order_id,
            client_oid: row.client_oid,
            symbol: row.symbol,
            side,
            order_type,
            order_role,
            status,
            price: row.price.as_deref().map(parse_decimal),
            trigger_price: row.trigger_price.as_deref().map(parse_decimal),
            avg_price: row.avg_price.as_deref().map(parse_decimal),
            quantity: parse_decimal(&row.quantity),
            cumulative_quantity: parse_decimal(&row.cumulative_quantity),
            cumulative_value: parse_decimal(&row.cumulative_value),
            parent_order_id: row.parent_order_id,
            oco_group_id: row.oco_group_id,
            source,
            exchange_create_time: row.exchange_create_time,
            exchange_update_time: row.exchange_update_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn upsert(&self, order: Order) -> Result<(), OrderStoreError> {
        let window_start = now_ms() - crate::application::order_store::trait_def::DUPLICATE_SUPPRESSION_WINDOW_MS;

        let duplicate: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT exchange_order_id FROM orders
            WHERE exchange_order_id != $1
              AND symbol = $2 AND side = $3 AND quantity = $4
              AND price IS $5 AND order_role IS $6
              AND updated_at >= $7
            LIMIT 1
            "#,
        )
        .bind(&order.exchange_order_id)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.quantity.to_string())
        .bind(order.price.map(|p| p.to_string()))
        .bind(order.order_role.map(|r| r.to_string()))
        .bind(window_start)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(|e| Self::map_err("duplicate check failed", e))?;

        if duplicate.is_some() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO orders (
                exchange_order_id, client_oid, symbol, side, order_type, order_role,
                status, price, trigger_price, avg_price, quantity, cumulative_quantity,
                cumulative_value, parent_order_id, oco_group_id, source,
                exchange_create_time, exchange_update_time, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                COALESCE($14, (SELECT parent_order_id FROM orders WHERE exchange_order_id = $1)),
                COALESCE($15, (SELECT oco_group_id FROM orders WHERE exchange_order_id = $1)),
                $16, $17, $18, $19, $20
            )
            ON CONFLICT(exchange_order_id) DO UPDATE SET
                client_oid = excluded.client_oid,
                status = excluded.status,
                price = excluded.price,
                trigger_price = excluded.trigger_price,
                avg_price = excluded.avg_price,
                quantity = excluded.quantity,
                cumulative_quantity = excluded.cumulative_quantity,
                cumulative_value = excluded.cumulative_value,
                parent_order_id = COALESCE(excluded.parent_order_id, orders.parent_order_id),
                oco_group_id = COALESCE(excluded.oco_group_id, orders.oco_group_id),
                exchange_update_time = excluded.exchange_update_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&order.exchange_order_id)
        .bind(&order.client_oid)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.order_role.map(|r| r.to_string()))
        .bind(order.status.to_string())
        .bind(order.price.map(|p| p.to_string()))
        .bind(order.trigger_price.map(|p| p.to_string()))
        .bind(order.avg_price.map(|p| p.to_string()))
        .bind(order.quantity.to_string())
        .bind(order.cumulative_quantity.to_string())
        .bind(order.cumulative_value.to_string())
        .bind(order.parent_order_id.clone())
        .bind(order.oco_group_id.clone())
        .bind(order.source.to_string())
        .bind(order.exchange_create_time)
        .bind(order.exchange_update_time)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.database.pool)
        .await
        .map_err(|e| Self::map_err("order upsert failed", e))?;

        Ok(())
    }

    async fn find_by_status(
        &self,
        symbol_or_base: &str,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, OrderStoreError> {
        let candidates = symbols_for(symbol_or_base);
        let status_strings: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        let mut out = Vec::new();
        for symbol in candidates {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "SELECT * FROM orders WHERE symbol = $1 AND status IN (SELECT value FROM json_each($2))",
            )
            .bind(&symbol)
            .bind(serde_json::to_string(&status_strings).unwrap_or_default())
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("find_by_status failed", e))?;

            for row in rows {
                out.push(Order::try_from(row)?);
            }
        }
        Ok(out)
    }

    async fn find_all_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, OrderStoreError> {
        let status_strings: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT * FROM orders WHERE status IN (SELECT value FROM json_each($1))",
        )
        .bind(serde_json::to_string(&status_strings).unwrap_or_default())
        .fetch_all(&self.database.pool)
        .await
        .map_err(|e| Self::map_err("find_all_by_status failed", e))?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn find_recent_buys(&self, symbol_or_base: &str, since: i64) -> Result<Vec<Order>, OrderStoreError> {
        let mut out = Vec::new();
        for symbol in symbols_for(symbol_or_base) {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "SELECT * FROM orders WHERE symbol = $1 AND side = 'BUY' AND exchange_create_time >= $2",
            )
            .bind(&symbol)
            .bind(since)
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("find_recent_buys failed", e))?;
            for row in rows {
                out.push(Order::try_from(row)?);
            }
        }
        Ok(out)
    }

    async fn find_siblings_in_oco(&self, oco_group_id: &str) -> Result<Vec<Order>, OrderStoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE oco_group_id = $1")
            .bind(oco_group_id)
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("find_siblings_in_oco failed", e))?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn find_children(&self, parent_order_id: &str) -> Result<Vec<Order>, OrderStoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE parent_order_id = $1")
            .bind(parent_order_id)
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("find_children failed", e))?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn filled_buys_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError> {
        let mut out = Vec::new();
        for symbol in symbols_for(symbol_or_base) {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "SELECT * FROM orders WHERE symbol = $1 AND side = 'BUY' AND status = 'FILLED' ORDER BY exchange_create_time ASC",
            )
            .bind(&symbol)
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("filled_buys_in_fifo_order failed", e))?;
            for row in rows {
                out.push(Order::try_from(row)?);
            }
        }
        out.sort_by_key(|o| o.exchange_create_time);
        Ok(out)
    }

    async fn filled_sells_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError> {
        let mut out = Vec::new();
        for symbol in symbols_for(symbol_or_base) {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "SELECT * FROM orders WHERE symbol = $1 AND side = 'SELL' AND status = 'FILLED' ORDER BY exchange_create_time ASC",
            )
            .bind(&symbol)
            .fetch_all(&self.database.pool)
            .await
            .map_err(|e| Self::map_err("filled_sells_in_fifo_order failed", e))?;
            for row in rows {
                out.push(Order::try_from(row)?);
            }
        }
        out.sort_by_key(|o| o.exchange_create_time);
        Ok(out)
    }
}

/// If `symbol_or_base` already carries a quote suffix, query it alone;
/// otherwise expand to both `USDT`/`USD` variants (`spec.md` §4.4).
fn symbols_for(symbol_or_base: &str) -> Vec<String> {
    if symbol_or_base.contains('_') {
        vec![symbol_or_base.to_string()]
    } else {
        quote_variants(symbol_or_base).to_vec()
    }
}

