//! Invariant-style property checks over the same components `scenarios.rs`
//! exercises narratively.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use sentrytrade::application::order_store::{InMemoryOrderStore, OrderStore};
use sentrytrade::domain::alerts::AlertThrottler;
use sentrytrade::domain::guardrails::{GuardrailContext, GuardrailPipeline, PlacementKind, PortfolioSnapshot};
use sentrytrade::domain::pricing::{InstrumentMetadata, PriceNormalizer, PriceRole};
use sentrytrade::domain::trading::types::{Order, OrderSide, OrderSource, OrderStatus, OrderType, SltpMode, WatchlistItem};
use sentrytrade::infrastructure::notifier::{Notifier, NotifierError, InlineButton};

fn watchlist_item() -> WatchlistItem {
    WatchlistItem {
        symbol: "ADA_USDT".to_string(),
        alert_enabled: true,
        trade_enabled: true,
        trade_amount_usd: dec!(100),
        trade_on_margin: false,
        sl_tp_mode: SltpMode::Conservative,
        sl_percentage: None,
        tp_percentage: None,
        min_price_change_pct: dec!(1.0),
        skip_sl_tp_reminder: false,
        buy_target: None,
        purchase_price: None,
        is_deleted: false,
    }
}

fn snapshot(open_positions_for_base: u32) -> PortfolioSnapshot {
    PortfolioSnapshot {
        as_of: 1_000,
        open_positions_for_base,
        total_open_positions: open_positions_for_base,
        portfolio_value_for_symbol: Decimal::ZERO,
        available_balance_usd: dec!(10_000),
        daily_notional_placed_usd: Decimal::ZERO,
    }
}

/// P1 — for every `open_positions_for_base` from 0 up to and beyond the cap,
/// the pipeline only allows entry while strictly below `MAX_OPEN_PER_SYMBOL`.
#[test]
fn p1_per_base_exposure_cap_holds_at_every_count() {
    let item = watchlist_item();
    let pipeline = GuardrailPipeline::standard();
    const MAX_OPEN_PER_SYMBOL: u32 = 3;

    for count in 0..=6 {
        let snap = snapshot(count);
        let ctx = GuardrailContext {
            watchlist_item: &item,
            current_price: dec!(0.5),
            current_time_ms: 1_000,
            snapshot: &snap,
            has_recent_buy_within_cooldown: false,
            last_order_price: None,
            creation_lock_held: false,
            margin_locked_609: false,
            live_trading: true,
            max_open_per_symbol: MAX_OPEN_PER_SYMBOL,
            max_open_global: 100,
            max_snapshot_age_ms: 60_000,
            recent_order_cooldown_ms: 0,
        };
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        assert_eq!(
            decision.allowed,
            count < MAX_OPEN_PER_SYMBOL,
            "count={count} should only be allowed while below the cap"
        );
    }
}

/// P2 — consecutive same-side alerts: blocked below the price-change floor
/// whether `trade_enabled` is true or false, allowed once the floor is met;
/// a trade-enabled pair is additionally allowed once the cooldown elapses
/// with no price change at all. Opposite-side alerts are never throttled.
#[tokio::test]
async fn p2_alert_throttle_spacing_invariants() {
    for trade_enabled in [true, false] {
        let throttler = AlertThrottler::new(5_000);
        throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;

        let below_floor = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.503), trade_enabled, dec!(1.0), 1_000)
            .await;
        assert!(!below_floor.should_send, "trade_enabled={trade_enabled}: 0.6% move must not pass a 1% floor");

        let at_floor = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.510), trade_enabled, dec!(1.0), 1_000)
            .await;
        assert!(at_floor.should_send, "trade_enabled={trade_enabled}: 2% move must pass a 1% floor");
    }

    let cooldown_throttler = AlertThrottler::new(5_000);
    cooldown_throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;
    let before_cooldown = cooldown_throttler
        .should_send("ADA_USDT", OrderSide::Buy, dec!(0.500), true, dec!(1.0), 4_999)
        .await;
    assert!(!before_cooldown.should_send);
    let after_cooldown = cooldown_throttler
        .should_send("ADA_USDT", OrderSide::Buy, dec!(0.500), true, dec!(1.0), 5_000)
        .await;
    assert!(after_cooldown.should_send);

    let opposite_throttler = AlertThrottler::new(5_000);
    opposite_throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;
    let opposite = opposite_throttler
        .should_send("ADA_USDT", OrderSide::Sell, dec!(0.500), true, dec!(1.0), 100)
        .await;
    assert!(opposite.should_send, "opposite-side alerts must never be throttled");
}

fn order(id: &str, side: OrderSide, qty: Decimal, time: i64) -> Order {
    Order {
        exchange_order_id: id.to_string(),
        client_oid: format!("c_{id}"),
        symbol: "ADA_USDT".to_string(),
        side,
        order_type: OrderType::Market,
        order_role: None,
        status: OrderStatus::Filled,
        price: Some(dec!(0.5)),
        trigger_price: None,
        avg_price: Some(dec!(0.5)),
        quantity: qty,
        cumulative_quantity: qty,
        cumulative_value: qty * dec!(0.5),
        parent_order_id: None,
        oco_group_id: None,
        source: OrderSource::Auto,
        exchange_create_time: time,
        exchange_update_time: time,
        created_at: time,
        updated_at: time,
    }
}

/// P3 — across a stream of filled BUYs and SELLs on one base currency, the
/// sum of reconstructed open-lot quantity equals total bought minus total
/// sold. Exercised directly against the FIFO-ordered `OrderStore` queries
/// `ExpectedTpEngine::rebuild_open_lots` consumes.
#[tokio::test]
async fn p3_open_lot_quantity_equals_buys_minus_sells() {
    let store = Arc::new(InMemoryOrderStore::new());
    let buys = [
        order("b1", OrderSide::Buy, dec!(10), 1),
        order("b2", OrderSide::Buy, dec!(20), 2),
        order("b3", OrderSide::Buy, dec!(5), 3),
    ];
    let sells = [order("s1", OrderSide::Sell, dec!(12), 4)];

    for o in buys.iter().chain(sells.iter()) {
        store.upsert(o.clone()).await.unwrap();
    }

    let fifo_buys = store.filled_buys_in_fifo_order("ADA").await.unwrap();
    let fifo_sells = store.filled_sells_in_fifo_order("ADA").await.unwrap();

    let total_bought: Decimal = fifo_buys.iter().map(|o| o.cumulative_quantity).sum();
    let total_sold: Decimal = fifo_sells.iter().map(|o| o.cumulative_quantity).sum();

    // Mirror ExpectedTpEngine::rebuild_open_lots's FIFO consumption directly,
    // since it is a private method: the sum of remaining lot quantity must
    // equal bought minus sold regardless of how the residue is distributed
    // across individual buys.
    let mut sell_residue: Vec<Decimal> = fifo_sells.iter().map(|s| s.cumulative_quantity).collect();
    let mut sell_idx = 0usize;
    let mut lot_qty_sum = Decimal::ZERO;
    for buy in &fifo_buys {
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
        lot_qty_sum += remaining;
    }

    assert_eq!(lot_qty_sum, total_bought - total_sold);
}

/// P4 — within every OCO group, the two members have opposite roles and
/// share the same `parent_order_id`, as produced by `ProtectiveOrderEngine`.
#[test]
fn p4_oco_group_members_have_opposite_roles_and_shared_parent() {
    use sentrytrade::domain::trading::types::OrderRole;

    let sl = Order {
        order_role: Some(OrderRole::StopLoss),
        parent_order_id: Some("entry1".to_string()),
        oco_group_id: Some("oco_entry1_1".to_string()),
        ..order("sl1", OrderSide::Sell, dec!(100), 1)
    };
    let tp = Order {
        order_role: Some(OrderRole::TakeProfit),
        parent_order_id: Some("entry1".to_string()),
        oco_group_id: Some("oco_entry1_1".to_string()),
        ..order("tp1", OrderSide::Sell, dec!(100), 2)
    };

    assert_eq!(sl.oco_group_id, tp.oco_group_id);
    assert_eq!(sl.parent_order_id, tp.parent_order_id);
    assert_ne!(sl.order_role, tp.order_role);
}

struct FaultyNotifier;

#[async_trait]
impl Notifier for FaultyNotifier {
    async fn send_message(
        &self,
        _text: &str,
        _buttons: Option<Vec<InlineButton>>,
        _symbol: Option<&str>,
    ) -> Result<(), NotifierError> {
        Err(NotifierError::Transport("simulated outage".to_string()))
    }
}

/// P6 — alert state is committed before the send is attempted: even when the
/// send itself fails, the throttle state reflects the attempt, so the next
/// tick does not re-send for the same (symbol, side, price).
#[tokio::test]
async fn p6_alert_state_committed_before_send_survives_send_failure() {
    let throttler = AlertThrottler::new(5_000);
    let notifier = FaultyNotifier;

    let decision = throttler
        .should_send("ADA_USDT", OrderSide::Buy, dec!(0.5), true, dec!(1.0), 0)
        .await;
    assert!(decision.should_send);
    throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.5), 0).await;
    let send_result = notifier.send_message("BUY signal", None, Some("ADA_USDT")).await;
    assert!(send_result.is_err());

    let retry_same_tick = throttler
        .should_send("ADA_USDT", OrderSide::Buy, dec!(0.5), true, dec!(1.0), 1_000)
        .await;
    assert!(!retry_same_tick.should_send, "committed state must suppress a re-send even though delivery failed");
}

/// P7 — `PriceNormalizer` is idempotent for every role, across a spread of
/// representative raw prices and quantities.
#[test]
fn p7_price_normalizer_round_trips() {
    let metadata = InstrumentMetadata {
        price_tick_size: dec!(0.001),
        quantity_step: dec!(0.1),
        min_quantity: dec!(1.0),
        min_notional: dec!(10.0),
        price_decimals: 3,
        quantity_decimals: 1,
        max_leverage: 10,
    };

    let raw_prices = [dec!(0.5001), dec!(0.5009), dec!(0.5005), dec!(1.23456), dec!(99.9995)];
    for role in [PriceRole::Entry, PriceRole::StopLoss, PriceRole::TakeProfit] {
        for &raw in &raw_prices {
            let once = PriceNormalizer::normalize_price(raw, role, &metadata);
            let twice = PriceNormalizer::normalize_price(once, role, &metadata);
            assert_eq!(once, twice, "role={role:?} raw={raw}");
        }
    }

    let raw_quantities = [dec!(12.37), dec!(100.05), dec!(3.14159)];
    for &raw in &raw_quantities {
        let Ok(once) = PriceNormalizer::normalize_quantity("ADA_USDT", raw, dec!(1.0), &metadata) else {
            continue;
        };
        let twice = PriceNormalizer::normalize_quantity("ADA_USDT", once, dec!(1.0), &metadata).unwrap();
        assert_eq!(once, twice, "raw={raw}");
    }
}
