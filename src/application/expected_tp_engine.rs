//! C10 ExpectedTPEngine (`spec.md` §4.10): reconstructs FIFO open lots per
//! symbol from `OrderStore` history and matches them against live TP orders
//! to report expected profit. Pure read path — never writes to `OrderStore`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::order_store::{OrderStore, OrderStoreError};
use crate::domain::errors::ExchangeError;
use crate::domain::trading::types::{quote_variants, OpenLot, Order, OrderRole, OrderStatus};
use crate::infrastructure::exchange::{ExchangeClient, Ticker};

#[derive(Debug, thiserror::Error)]
pub enum ExpectedTpEngineError {
    #[error(transparent)]
    OrderStore(#[from] OrderStoreError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Which pass matched a TP to its lot (`spec.md` §4.10 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    Oco,
    Fifo,
}

#[derive(Debug, Clone)]
pub struct MatchedPortion {
    pub tp_order_id: String,
    pub tp_price: Decimal,
    pub matched_qty: Decimal,
    pub origin: MatchOrigin,
}

#[derive(Debug, Clone)]
pub struct LotReport {
    pub lot: OpenLot,
    pub matched: Vec<MatchedPortion>,
    pub covered_qty: Decimal,
}

impl LotReport {
    pub fn uncovered_qty(&self) -> Decimal {
        (self.lot.lot_qty - self.covered_qty).max(Decimal::ZERO)
    }

    pub fn expected_profit(&self) -> Decimal {
        self.matched
            .iter()
            .map(|m| (m.tp_price - self.lot.buy_price) * m.matched_qty)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct SymbolTpReport {
    pub symbol: String,
    pub net_qty: Decimal,
    pub current_price: Decimal,
    pub position_value: Decimal,
    pub actual_position_value: Decimal,
    pub covered_qty: Decimal,
    pub uncovered_qty: Decimal,
    pub total_expected_profit: Decimal,
    pub lots: Vec<LotReport>,
}

/// FIFO-coverage tolerance bands used by the two-pass TP matcher
/// (`spec.md` §4.10 step 2).
const OCO_GROUP_COVERAGE_MIN: Decimal = dec!(0.90);
const FIFO_TP_COVERS_MANY_LOTS_OVERAGE: Decimal = dec!(1.15);
const FIFO_LOTS_COVERED_BY_MANY_TPS_MIN: Decimal = dec!(0.85);

pub struct ExpectedTpEngine {
    order_store: Arc<dyn OrderStore>,
    exchange: Arc<dyn ExchangeClient>,
}

impl ExpectedTpEngine {
    pub fn new(order_store: Arc<dyn OrderStore>, exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { order_store, exchange }
    }

    pub async fn report_for_symbol(&self, base: &str) -> Result<SymbolTpReport, ExpectedTpEngineError> {
        let lots = self.rebuild_open_lots(base).await?;
        let active_tps = self.active_take_profits(base).await?;
        let matched_lots = match_tps_to_lots(lots, active_tps);

        let ticker = self.exchange.get_ticker(&quote_variants(base)[0]).await?;
        self.summarize(base, matched_lots, ticker)
    }

    fn summarize(
        &self,
        base: &str,
        lots: Vec<LotReport>,
        ticker: Ticker,
    ) -> Result<SymbolTpReport, ExpectedTpEngineError> {
        let net_qty: Decimal = lots.iter().map(|l| l.lot.lot_qty).sum();
        let covered_qty: Decimal = lots.iter().map(|l| l.covered_qty).sum();
        let actual_position_value: Decimal =
            lots.iter().map(|l| l.lot.buy_price * l.lot.lot_qty).sum();
        let total_expected_profit: Decimal = lots.iter().map(|l| l.expected_profit()).sum();

        Ok(SymbolTpReport {
            symbol: base.to_string(),
            net_qty,
            current_price: ticker.last,
            position_value: ticker.last * net_qty,
            actual_position_value,
            covered_qty,
            uncovered_qty: (net_qty - covered_qty).max(Decimal::ZERO),
            total_expected_profit,
            lots,
        })
    }

    /// `rebuildOpenLots` (`spec.md` §4.10 step 1): FIFO-consume filled BUYs
    /// against filled SELLs, tracking per-sell residue across buys; synthesize
    /// a virtual lot when no lots are reconstructable but a balance exists.
    async fn rebuild_open_lots(&self, base: &str) -> Result<Vec<OpenLot>, ExpectedTpEngineError> {
        let buys = self.order_store.filled_buys_in_fifo_order(base).await?;
        let sells = self.order_store.filled_sells_in_fifo_order(base).await?;

        let mut sell_residue: Vec<Decimal> = sells.iter().map(|s| s.cumulative_quantity).collect();
        let mut sell_idx = 0usize;

        let mut lots = Vec::new();
        for buy in &buys {
            let mut remaining = buy.cumulative_quantity;
            while remaining > Decimal::ZERO && sell_idx < sells.len() {
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
                lots.push(OpenLot {
                    symbol: buy.symbol.clone(),
                    buy_order_id: buy.exchange_order_id.clone(),
                    buy_time: buy.exchange_create_time,
                    buy_price: buy.avg_price.unwrap_or(buy.price.unwrap_or_default()),
                    lot_qty: remaining,
                    parent_order_id: buy.parent_order_id.clone(),
                    oco_group_id: buy.oco_group_id.clone(),
                    is_virtual: false,
                });
            }
        }

        if lots.is_empty()
            && let Some(virtual_lot) = self.synthesize_virtual_lot(base, &buys).await?
        {
            lots.push(virtual_lot);
        }

        Ok(lots)
    }

    async fn synthesize_virtual_lot(
        &self,
        base: &str,
        buys: &[Order],
    ) -> Result<Option<OpenLot>, ExpectedTpEngineError> {
        let account = self.exchange.get_account_summary().await?;
        let balance = account
            .accounts
            .iter()
            .find(|b| b.currency.eq_ignore_ascii_case(base))
            .map(|b| b.balance)
            .unwrap_or_default();

        if balance <= Decimal::ZERO {
            return Ok(None);
        }

        let entry_price = if buys.is_empty() {
            self.exchange.get_ticker(&quote_variants(base)[0]).await?.last
        } else {
            let total_value: Decimal = buys
                .iter()
                .map(|b| b.avg_price.unwrap_or_default() * b.cumulative_quantity)
                .sum();
            let total_qty: Decimal = buys.iter().map(|b| b.cumulative_quantity).sum();
            if total_qty.is_zero() {
                self.exchange.get_ticker(&quote_variants(base)[0]).await?.last
            } else {
                total_value / total_qty
            }
        };

        Ok(Some(OpenLot {
            symbol: base.to_string(),
            buy_order_id: format!("virtual_{base}"),
            buy_time: 0,
            buy_price: entry_price,
            lot_qty: balance,
            parent_order_id: None,
            oco_group_id: None,
            is_virtual: true,
        }))
    }

    async fn active_take_profits(&self, base: &str) -> Result<Vec<Order>, ExpectedTpEngineError> {
        let orders = self
            .order_store
            .find_by_status(base, &[OrderStatus::Active, OrderStatus::New, OrderStatus::PartiallyFilled])
            .await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.order_role == Some(OrderRole::TakeProfit))
            .collect())
    }
}

fn match_tps_to_lots(lots: Vec<OpenLot>, tps: Vec<Order>) -> Vec<LotReport> {
    let mut reports: Vec<LotReport> = lots
        .into_iter()
        .map(|lot| LotReport { lot, matched: Vec::new(), covered_qty: Decimal::ZERO })
        .collect();
    let mut remaining_tp_qty: HashMap<String, Decimal> =
        tps.iter().map(|t| (t.exchange_order_id.clone(), t.quantity)).collect();

    // OCO pass: exact match within the same group first, then summed coverage.
    let mut groups: HashMap<String, Vec<&Order>> = HashMap::new();
    for tp in &tps {
        if let Some(group) = &tp.oco_group_id {
            groups.entry(group.clone()).or_default().push(tp);
        }
    }

    for report in reports.iter_mut() {
        let Some(group) = report.lot.oco_group_id.clone() else { continue };
        let Some(members) = groups.get(&group) else { continue };

        if let Some(exact) = members.iter().find(|m| {
            remaining_tp_qty.get(&m.exchange_order_id).copied().unwrap_or_default() == report.lot.lot_qty
        }) {
            apply_match(report, exact, report.lot.lot_qty, MatchOrigin::Oco, &mut remaining_tp_qty);
            continue;
        }

        let mut ordered = members.clone();
        ordered.sort_by_key(|o| o.exchange_create_time);
        let mut covered = Decimal::ZERO;
        for tp in ordered {
            if covered >= report.lot.lot_qty * OCO_GROUP_COVERAGE_MIN {
                break;
            }
            let available = remaining_tp_qty.get(&tp.exchange_order_id).copied().unwrap_or_default();
            if available <= Decimal::ZERO {
                continue;
            }
            let take = available.min(report.lot.lot_qty - covered);
            if take <= Decimal::ZERO {
                continue;
            }
            apply_match(report, tp, take, MatchOrigin::Oco, &mut remaining_tp_qty);
            covered += take;
        }
    }

    // FIFO pass over whatever is still unmatched.
    let mut ordered_tps: Vec<&Order> = tps.iter().collect();
    ordered_tps.sort_by_key(|o| o.exchange_create_time);

    for report in reports.iter_mut() {
        if report.covered_qty >= report.lot.lot_qty {
            continue;
        }
        for tp in &ordered_tps {
            let remaining_lot = report.lot.lot_qty - report.covered_qty;
            if remaining_lot <= Decimal::ZERO {
                break;
            }
            let available = remaining_tp_qty.get(&tp.exchange_order_id).copied().unwrap_or_default();
            if available <= Decimal::ZERO {
                continue;
            }
            // one TP covering many lots: allow up to 15% overage on this lot.
            if available >= remaining_lot && available <= remaining_lot * FIFO_TP_COVERS_MANY_LOTS_OVERAGE {
                apply_match(report, tp, remaining_lot, MatchOrigin::Fifo, &mut remaining_tp_qty);
                break;
            }
            // many small TPs covering one lot: accept once at least 85% covered.
            if available < remaining_lot {
                let take = available;
                apply_match(report, tp, take, MatchOrigin::Fifo, &mut remaining_tp_qty);
                if report.covered_qty >= report.lot.lot_qty * FIFO_LOTS_COVERED_BY_MANY_TPS_MIN {
                    break;
                }
            }
        }
    }

    reports
}

fn apply_match(
    report: &mut LotReport,
    tp: &Order,
    qty: Decimal,
    origin: MatchOrigin,
    remaining_tp_qty: &mut HashMap<String, Decimal>,
) {
    if qty <= Decimal::ZERO {
        return;
    }
    report.matched.push(MatchedPortion {
        tp_order_id: tp.exchange_order_id.clone(),
        tp_price: tp.price.or(tp.trigger_price).unwrap_or_default(),
        matched_qty: qty,
        origin,
    });
    report.covered_qty += qty;
    if let Some(remaining) = remaining_tp_qty.get_mut(&tp.exchange_order_id) {
        *remaining -= qty;
    }
}
