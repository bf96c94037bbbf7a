//! C6 ProtectiveOrderEngine (`spec.md` §4.6): given a filled entry, creates
//! its STOP_LOSS/TAKE_PROFIT OCO pair, handling the 609 margin-lockout and
//! 306 leverage-ladder recovery paths.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::application::leverage_cache::LeverageCache;
use crate::application::order_store::{OrderStore, OrderStoreError};
use crate::application::watchlist_store::WatchlistStore;
use crate::domain::errors::{ExchangeError, ValidationError};
use crate::domain::pricing::{InstrumentMetadataCache, MetadataSource, PriceNormalizer, PriceRole};
use crate::domain::trading::locks::{margin_lockout_609_set, ExpiringLockSet};
use crate::domain::trading::types::{
    Order, OrderRole, OrderSide, OrderSource, OrderStatus, OrderType, WatchlistItem,
};
use crate::infrastructure::exchange::{ExchangeClient, OrderSize};

#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionOutcome {
    /// Both SL and TP already existed and were active; nothing to do.
    AlreadyProtected,
    /// Both legs placed successfully.
    FullyProtected { oco_group_id: String },
    /// One leg placed, the other rejected; `C11` will surface the gap.
    PartiallyProtected {
        oco_group_id: String,
        failed_role: OrderRole,
        reason: String,
    },
    /// Filled quantity is too small to protect at all.
    UnprotectedSmallPosition { topup: Decimal },
    /// Both legs failed for balance/margin reasons after exhausting recovery.
    InsufficientBalance,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtectiveOrderEngineError {
    #[error(transparent)]
    Store(#[from] OrderStoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("watchlist item missing for {0}")]
    NoWatchlistItem(String),
}

pub struct ProtectiveOrderEngine {
    order_store: Arc<dyn OrderStore>,
    watchlist_store: Arc<dyn WatchlistStore>,
    exchange: Arc<dyn ExchangeClient>,
    metadata_cache: Arc<InstrumentMetadataCache>,
    metadata_source: Arc<dyn MetadataSource>,
    leverage_cache: Arc<LeverageCache>,
    margin_lockouts: ExpiringLockSet<String>,
}

impl ProtectiveOrderEngine {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        watchlist_store: Arc<dyn WatchlistStore>,
        exchange: Arc<dyn ExchangeClient>,
        metadata_cache: Arc<InstrumentMetadataCache>,
        metadata_source: Arc<dyn MetadataSource>,
        leverage_cache: Arc<LeverageCache>,
    ) -> Self {
        Self {
            order_store,
            watchlist_store,
            exchange,
            metadata_cache,
            metadata_source,
            leverage_cache,
            margin_lockouts: margin_lockout_609_set(),
        }
    }

    pub async fn is_margin_locked(&self, symbol: &str) -> bool {
        self.margin_lockouts.is_locked(&symbol.to_string()).await
    }

    /// `spec.md` §4.6, steps 1-7 (the 306/609 recovery ladders in steps 8-9
    /// live in `place_entry_with_recovery`, which callers invoke before a fill
    /// exists; this method starts from an already-filled entry).
    pub async fn create_for_filled(
        &self,
        entry: &Order,
    ) -> Result<ProtectionOutcome, ProtectiveOrderEngineError> {
        // Step 1: idempotency.
        let children = self.order_store.find_children(&entry.exchange_order_id).await?;
        let has_active_sl = children
            .iter()
            .any(|c| c.order_role == Some(OrderRole::StopLoss) && c.status.is_active());
        let has_active_tp = children
            .iter()
            .any(|c| c.order_role == Some(OrderRole::TakeProfit) && c.status.is_active());
        if has_active_sl && has_active_tp {
            return Ok(ProtectionOutcome::AlreadyProtected);
        }

        let watchlist_item = self
            .watchlist_store
            .get(&entry.symbol)
            .await
            .map_err(|e| ProtectiveOrderEngineError::NoWatchlistItem(e.to_string()))?
            .ok_or_else(|| ProtectiveOrderEngineError::NoWatchlistItem(entry.symbol.clone()))?;

        // Step 2-3: resolve percentages, compute target prices.
        let (sl_pct, tp_pct) = watchlist_item.resolved_percentages();
        let entry_price = entry.avg_price.unwrap_or(entry.price.unwrap_or_default());
        let (sl_raw, tp_raw) = match entry.side {
            OrderSide::Buy => (
                entry_price * (Decimal::ONE - sl_pct / Decimal::from(100)),
                entry_price * (Decimal::ONE + tp_pct / Decimal::from(100)),
            ),
            OrderSide::Sell => (
                entry_price * (Decimal::ONE + sl_pct / Decimal::from(100)),
                entry_price * (Decimal::ONE - tp_pct / Decimal::from(100)),
            ),
        };
        let protective_side = entry.side.opposite();

        // Step 4: normalization.
        let metadata = self
            .metadata_cache
            .get(&entry.symbol, self.metadata_source.as_ref())
            .await?;
        let normalized_qty = match PriceNormalizer::normalize_quantity(
            &entry.symbol,
            entry.cumulative_quantity,
            entry_price,
            &metadata,
        ) {
            Ok(qty) => qty,
            Err(ValidationError::BelowMinQty { normalized, .. }) => {
                let topup = ((metadata.min_quantity - normalized) / metadata.quantity_step).ceil()
                    * metadata.quantity_step;
                return Ok(ProtectionOutcome::UnprotectedSmallPosition { topup });
            }
            Err(other) => return Err(other.into()),
        };

        let sl_price = PriceNormalizer::normalize_price(sl_raw, PriceRole::StopLoss, &metadata);
        let mut tp_price = PriceNormalizer::normalize_price(tp_raw, PriceRole::TakeProfit, &metadata);

        // Step 5: auto-mode TP validity guard.
        if entry.source == OrderSource::Auto
            && let Ok(ticker) = self.exchange.get_ticker(&entry.symbol).await
        {
            let invalid = match protective_side {
                OrderSide::Sell => tp_price <= ticker.ask,
                OrderSide::Buy => tp_price >= ticker.bid,
            };
            if invalid {
                let shift = tp_price * Decimal::new(5, 3);
                tp_price = match protective_side {
                    OrderSide::Sell => tp_price + shift,
                    OrderSide::Buy => tp_price - shift,
                };
                tp_price = PriceNormalizer::normalize_price(tp_price, PriceRole::TakeProfit, &metadata);
            }
        }

        // Step 6: create OCO group.
        let oco_group_id = format!("oco_{}_{}", entry.exchange_order_id, Utc::now().timestamp());
        let now = Utc::now().timestamp_millis();

        let place_sl = !has_active_sl;
        let place_tp = !has_active_tp;

        let mut sl_outcome: Option<Result<(), ExchangeError>> = None;
        if place_sl {
            let result = self
                .place_and_persist_leg(
                    entry,
                    &oco_group_id,
                    OrderRole::StopLoss,
                    protective_side,
                    sl_price,
                    normalized_qty,
                    watchlist_item.trade_on_margin,
                    now,
                )
                .await;
            sl_outcome = Some(result);
        }

        let mut tp_outcome: Option<Result<(), ExchangeError>> = None;
        if place_tp {
            let result = self
                .place_and_persist_leg(
                    entry,
                    &oco_group_id,
                    OrderRole::TakeProfit,
                    protective_side,
                    tp_price,
                    normalized_qty,
                    watchlist_item.trade_on_margin,
                    now,
                )
                .await;
            tp_outcome = Some(result);
        }

        // Step 7: partial-failure policy.
        match (sl_outcome, tp_outcome) {
            (Some(Err(e)), _) => Ok(ProtectionOutcome::PartiallyProtected {
                oco_group_id,
                failed_role: OrderRole::StopLoss,
                reason: e.to_string(),
            }),
            (_, Some(Err(e))) => Ok(ProtectionOutcome::PartiallyProtected {
                oco_group_id,
                failed_role: OrderRole::TakeProfit,
                reason: e.to_string(),
            }),
            _ => Ok(ProtectionOutcome::FullyProtected { oco_group_id }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn place_and_persist_leg(
        &self,
        entry: &Order,
        oco_group_id: &str,
        role: OrderRole,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
        is_margin: bool,
        now: i64,
    ) -> Result<(), ExchangeError> {
        let placed = match role {
            OrderRole::StopLoss => {
                self.exchange
                    .place_stop_loss_order(&entry.symbol, side, price, qty, price, price, is_margin, None)
                    .await
            }
            OrderRole::TakeProfit => {
                self.exchange
                    .place_take_profit_order(&entry.symbol, side, price, qty, price, price, is_margin, None)
                    .await
            }
        };

        let (exchange_order_id, status) = match &placed {
            Ok(p) => (p.exchange_order_id.clone(), p.status),
            Err(_) => (format!("rejected_{}_{now}", role), OrderStatus::Rejected),
        };

        let order = Order {
            exchange_order_id,
            client_oid: format!("{}_{}", entry.exchange_order_id, role),
            symbol: entry.symbol.clone(),
            side,
            order_type: match role {
                OrderRole::StopLoss => OrderType::StopLimit,
                OrderRole::TakeProfit => OrderType::TakeProfitLimit,
            },
            order_role: Some(role),
            status,
            price: Some(price),
            trigger_price: Some(price),
            avg_price: None,
            quantity: qty,
            cumulative_quantity: Decimal::ZERO,
            cumulative_value: Decimal::ZERO,
            parent_order_id: Some(entry.exchange_order_id.clone()),
            oco_group_id: Some(oco_group_id.to_string()),
            source: entry.source,
            exchange_create_time: now,
            exchange_update_time: now,
            created_at: now,
            updated_at: now,
        };
        let _ = self.order_store.upsert(order).await;

        placed.map(|_| ())
    }

    /// Steps 8-9: recovery ladder invoked when *placing the entry itself*
    /// fails with 609 (margin) or 306 (insufficient available balance).
    pub async fn place_entry_with_recovery(
        &self,
        watchlist_item: &WatchlistItem,
        side: OrderSide,
    ) -> Result<(), ExchangeError> {
        if watchlist_item.trade_on_margin {
            let ladder = self.leverage_cache.ladder_for(&watchlist_item.symbol).await;
            for leverage in ladder {
                match self
                    .exchange
                    .place_market_order(
                        &watchlist_item.symbol,
                        side,
                        OrderSize::NotionalUsd(watchlist_item.trade_amount_usd),
                        true,
                        Some(leverage),
                    )
                    .await
                {
                    Ok(_) => {
                        self.leverage_cache
                            .record_working_leverage(&watchlist_item.symbol, leverage)
                            .await;
                        return Ok(());
                    }
                    Err(ExchangeError::InsufficientMargin { symbol }) => {
                        self.margin_lockouts.try_acquire(symbol).await;
                        return self.retry_as_spot(watchlist_item, side).await;
                    }
                    Err(ExchangeError::InsufficientBalance { .. }) => continue,
                    Err(other) => return Err(other),
                }
            }
            // 1x exhausted: reduced-notional SPOT fallback.
            return self.retry_as_spot(watchlist_item, side).await;
        }

        self.exchange
            .place_market_order(
                &watchlist_item.symbol,
                side,
                OrderSize::NotionalUsd(watchlist_item.trade_amount_usd),
                false,
                None,
            )
            .await
            .map(|_| ())
    }

    async fn retry_as_spot(
        &self,
        watchlist_item: &WatchlistItem,
        side: OrderSide,
    ) -> Result<(), ExchangeError> {
        let reduced = (watchlist_item.trade_amount_usd * Decimal::new(95, 2))
            .max(Decimal::from(100));
        self.exchange
            .place_market_order(&watchlist_item.symbol, side, OrderSize::NotionalUsd(reduced), false, None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::order_store::InMemoryOrderStore;
    use crate::domain::pricing::InstrumentMetadata;
    use crate::infrastructure::exchange::{ExchangeMetadataSource, MockExchangeClient, Ticker};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct InMemoryWatchlistStore {
        item: WatchlistItem,
    }

    #[async_trait]
    impl WatchlistStore for InMemoryWatchlistStore {
        async fn get(
            &self,
            _symbol: &str,
        ) -> Result<Option<WatchlistItem>, crate::application::watchlist_store::WatchlistStoreError>
        {
            Ok(Some(self.item.clone()))
        }
        async fn upsert(
            &self,
            _item: WatchlistItem,
        ) -> Result<(), crate::application::watchlist_store::WatchlistStoreError> {
            Ok(())
        }
        async fn list_active(
            &self,
        ) -> Result<Vec<WatchlistItem>, crate::application::watchlist_store::WatchlistStoreError>
        {
            Ok(vec![self.item.clone()])
        }
        async fn soft_delete(
            &self,
            _symbol: &str,
        ) -> Result<(), crate::application::watchlist_store::WatchlistStoreError> {
            Ok(())
        }
    }

    fn sample_watchlist_item() -> WatchlistItem {
        WatchlistItem {
            symbol: "ADA_USDT".to_string(),
            alert_enabled: true,
            trade_enabled: true,
            trade_amount_usd: dec!(100),
            trade_on_margin: false,
            sl_tp_mode: crate::domain::trading::types::SltpMode::Conservative,
            sl_percentage: None,
            tp_percentage: None,
            min_price_change_pct: dec!(1),
            skip_sl_tp_reminder: false,
            buy_target: None,
            purchase_price: None,
            is_deleted: false,
        }
    }

    fn sample_metadata() -> InstrumentMetadata {
        InstrumentMetadata {
            price_tick_size: dec!(0.0001),
            quantity_step: dec!(0.1),
            min_quantity: dec!(1.0),
            min_notional: dec!(10.0),
            price_decimals: 4,
            quantity_decimals: 1,
            max_leverage: 10,
        }
    }

    fn filled_entry() -> Order {
        Order {
            exchange_order_id: "E1".to_string(),
            client_oid: "client_E1".to_string(),
            symbol: "ADA_USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            order_role: None,
            status: OrderStatus::Filled,
            price: None,
            trigger_price: None,
            avg_price: Some(dec!(0.50)),
            quantity: dec!(200),
            cumulative_quantity: dec!(200),
            cumulative_value: dec!(100),
            parent_order_id: None,
            oco_group_id: None,
            source: OrderSource::Auto,
            exchange_create_time: 1_000,
            exchange_update_time: 1_000,
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    async fn build_engine() -> (ProtectiveOrderEngine, Arc<MockExchangeClient>, Arc<InMemoryOrderStore>) {
        let order_store = Arc::new(InMemoryOrderStore::new());
        let watchlist_store = Arc::new(InMemoryWatchlistStore {
            item: sample_watchlist_item(),
        });
        let exchange = Arc::new(MockExchangeClient::new());
        exchange.set_metadata("ADA_USDT", sample_metadata()).await;
        exchange
            .set_ticker(
                "ADA_USDT",
                Ticker {
                    ask: dec!(0.51),
                    bid: dec!(0.49),
                    last: dec!(0.50),
                },
            )
            .await;
        let metadata_cache = Arc::new(InstrumentMetadataCache::new(Duration::from_secs(60)));
        let metadata_source: Arc<dyn MetadataSource> =
            Arc::new(ExchangeMetadataSource::new(exchange.clone() as Arc<dyn ExchangeClient>));
        let leverage_cache = Arc::new(LeverageCache::new());

        let engine = ProtectiveOrderEngine::new(
            order_store.clone(),
            watchlist_store,
            exchange.clone() as Arc<dyn ExchangeClient>,
            metadata_cache,
            metadata_source,
            leverage_cache,
        );
        (engine, exchange, order_store)
    }

    #[tokio::test]
    async fn fully_protects_a_filled_entry() {
        let (engine, _exchange, order_store) = build_engine().await;
        let outcome = engine.create_for_filled(&filled_entry()).await.unwrap();
        assert!(matches!(outcome, ProtectionOutcome::FullyProtected { .. }));

        let children = order_store.find_children("E1").await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().any(|c| c.order_role == Some(OrderRole::StopLoss)));
        assert!(children.iter().any(|c| c.order_role == Some(OrderRole::TakeProfit)));
    }

    #[tokio::test]
    async fn already_protected_entry_is_a_noop() {
        let (engine, _exchange, order_store) = build_engine().await;
        let entry = filled_entry();
        engine.create_for_filled(&entry).await.unwrap();

        let outcome = engine.create_for_filled(&entry).await.unwrap();
        assert_eq!(outcome, ProtectionOutcome::AlreadyProtected);

        let children = order_store.find_children("E1").await.unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn small_fill_below_min_quantity_reports_topup() {
        let (engine, _exchange, _store) = build_engine().await;
        let mut entry = filled_entry();
        entry.cumulative_quantity = dec!(0.3);
        entry.avg_price = Some(dec!(0.50));

        let outcome = engine.create_for_filled(&entry).await.unwrap();
        match outcome {
            ProtectionOutcome::UnprotectedSmallPosition { topup } => {
                assert_eq!(topup, dec!(0.7));
            }
            other => panic!("expected UnprotectedSmallPosition, got {other:?}"),
        }
    }
}
