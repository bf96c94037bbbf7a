//! C4 OrderStore contract (`spec.md` §4.4): persists every `Order` by
//! `exchange_order_id`, idempotent on upsert, with duplicate suppression and
//! FIFO-ordered lot queries. Implemented by `SqliteOrderStore` and
//! `InMemoryOrderStore`.

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::trading::types::{Order, OrderStatus};

#[derive(Debug, thiserror::Error)]
pub enum OrderStoreError {
    #[error("order store backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Idempotent by `exchange_order_id`; a second semantically identical
    /// upsert (same symbol/side/role/price/quantity) within 5 s is rejected
    /// as a duplicate rather than overwriting, and `parent_order_id`/
    /// `oco_group_id` are preserved across updates.
    async fn upsert(&self, order: Order) -> Result<(), OrderStoreError>;

    /// Base-currency queries treat `BASE_USD` and `BASE_USDT` as one set
    /// (`spec.md` §3, symbol equivalence).
    async fn find_by_status(
        &self,
        symbol_or_base: &str,
        statuses: &[OrderStatus],
    ) -> Result<Vec<Order>, OrderStoreError>;

    /// Every order in one of `statuses`, across all symbols. Used by
    /// `ExchangeSync`'s stale-order sweep, which has no single symbol scope.
    async fn find_all_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, OrderStoreError>;

    async fn find_recent_buys(
        &self,
        symbol_or_base: &str,
        since: i64,
    ) -> Result<Vec<Order>, OrderStoreError>;

    async fn find_siblings_in_oco(&self, oco_group_id: &str) -> Result<Vec<Order>, OrderStoreError>;

    async fn find_children(&self, parent_order_id: &str) -> Result<Vec<Order>, OrderStoreError>;

    /// Ordered by `exchange_create_time` ascending for FIFO lot reconstruction.
    async fn filled_buys_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError>;

    async fn filled_sells_in_fifo_order(&self, symbol_or_base: &str) -> Result<Vec<Order>, OrderStoreError>;
}

/// 5 s duplicate-suppression window shared by every `OrderStore` impl
/// (`spec.md` §4.4).
pub const DUPLICATE_SUPPRESSION_WINDOW_MS: i64 = 5_000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
