//! C11 SLTPChecker (`spec.md` §4.11): periodic sweep over non-zero balances,
//! flagging positions missing protective orders and OCO integrity problems.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::order_store::{OrderStore, OrderStoreError};
use crate::application::watchlist_store::{WatchlistStore, WatchlistStoreError};
use crate::domain::errors::ExchangeError;
use crate::domain::trading::types::{quote_variants, Order, OrderRole, OrderSide};
use crate::infrastructure::exchange::ExchangeClient;
use crate::infrastructure::notifier::{InlineButton, Notifier, NotifierError};

/// Stablecoins and fiat pseudo-balances excluded from the sweep
/// (`spec.md` §4.11 step 1: "non-stablecoin, non-fiat account").
const EXCLUDED_CURRENCIES: &[&str] = &["USD", "USDT", "USDC", "DAI"];

/// Balance/order-quantity tolerance used to discard protective orders left
/// over from a now-closed position (`spec.md` §4.11 step 1).
const QUANTITY_MATCH_TOLERANCE: Decimal = dec!(0.05);

#[derive(Debug, thiserror::Error)]
pub enum SltpCheckerError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    OrderStore(#[from] OrderStoreError),
    #[error(transparent)]
    WatchlistStore(#[from] WatchlistStoreError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
}

#[derive(Debug, Clone)]
pub struct UnprotectedPosition {
    pub base: String,
    pub balance: Decimal,
    pub has_sl: bool,
    pub has_tp: bool,
    pub suggested_sl_price: Option<Decimal>,
    pub suggested_tp_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct OcoIntegrityIssue {
    pub order_id: String,
    pub symbol: String,
    pub description: String,
}

pub struct SltpChecker {
    order_store: Arc<dyn OrderStore>,
    watchlist_store: Arc<dyn WatchlistStore>,
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
}

impl SltpChecker {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        watchlist_store: Arc<dyn WatchlistStore>,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { order_store, watchlist_store, exchange, notifier }
    }

    pub async fn sweep(&self) {
        if let Err(err) = self.sweep_fallible().await {
            error!(error = %err, "sltp checker sweep failed");
        }
    }

    async fn sweep_fallible(&self) -> Result<(), SltpCheckerError> {
        let account = self.exchange.get_account_summary().await?;
        let mut live = self.exchange.list_open_orders().await?;
        live.extend(self.exchange.list_trigger_orders().await?);
        self.enrich_with_persisted_metadata(&mut live).await;

        for balance in &account.accounts {
            if EXCLUDED_CURRENCIES.contains(&balance.currency.as_str()) || balance.balance <= Decimal::ZERO {
                continue;
            }
            self.check_position(&balance.currency, balance.balance, &live).await?;
        }

        self.report_oco_integrity_issues(&live).await;
        Ok(())
    }

    /// Exchange listings never carry `oco_group_id` natively and only recover
    /// `parent_order_id`/`order_role` by decoding `client_oid`; `oco_group_id`
    /// is backfilled here from the persisted sibling `ProtectiveOrderEngine`
    /// already wrote via `order_store.find_children`.
    async fn enrich_with_persisted_metadata(&self, live: &mut [Order]) {
        for order in live.iter_mut().filter(|o| o.oco_group_id.is_none()) {
            let Some(parent_id) = order.parent_order_id.clone() else {
                continue;
            };
            let siblings = match self.order_store.find_children(&parent_id).await {
                Ok(siblings) => siblings,
                Err(err) => {
                    error!(error = %err, parent_order_id = %parent_id, "failed to load persisted siblings");
                    continue;
                }
            };
            if let Some(persisted) = siblings
                .iter()
                .find(|s| s.exchange_order_id == order.exchange_order_id)
            {
                order.oco_group_id = persisted.oco_group_id.clone();
                if order.order_role.is_none() {
                    order.order_role = persisted.order_role;
                }
            }
        }
    }

    async fn check_position(
        &self,
        base: &str,
        balance: Decimal,
        live_orders: &[Order],
    ) -> Result<(), SltpCheckerError> {
        let variants = quote_variants(base);
        let protective: Vec<&Order> = live_orders
            .iter()
            .filter(|o| variants.contains(&o.symbol) && o.status.is_active())
            .filter(|o| quantity_within_balance_tolerance(o.quantity, balance))
            .collect();

        let has_sl = protective.iter().any(|o| is_stop_loss(o));
        let has_tp = protective.iter().any(|o| matches!(o.order_role, Some(OrderRole::TakeProfit)));

        if has_sl && has_tp {
            return Ok(());
        }

        let symbol = &variants[0];
        let item = self.watchlist_store.get(base).await?;
        if item.as_ref().map(|i| i.skip_sl_tp_reminder).unwrap_or(false) {
            return Ok(());
        }

        let ticker = self.exchange.get_ticker(symbol).await?;
        let (sl_pct, tp_pct) = item
            .as_ref()
            .map(|i| i.resolved_percentages())
            .unwrap_or((dec!(3), dec!(3)));
        let suggested_sl_price = (!has_sl).then(|| ticker.last * (Decimal::ONE - sl_pct / dec!(100)));
        let suggested_tp_price = (!has_tp).then(|| ticker.last * (Decimal::ONE + tp_pct / dec!(100)));

        let position = UnprotectedPosition {
            base: base.to_string(),
            balance,
            has_sl,
            has_tp,
            suggested_sl_price,
            suggested_tp_price,
        };
        self.notify_unprotected(&position).await?;
        Ok(())
    }

    async fn notify_unprotected(&self, position: &UnprotectedPosition) -> Result<(), SltpCheckerError> {
        let text = format!(
            "{} has an unprotected position (balance {}). SL present: {}, TP present: {}",
            position.base, position.balance, position.has_sl, position.has_tp
        );
        let buttons: Vec<InlineButton> = vec![
            ("Create SL & TP".to_string(), format!("sltp:both:{}", position.base)),
            ("SL only".to_string(), format!("sltp:sl:{}", position.base)),
            ("TP only".to_string(), format!("sltp:tp:{}", position.base)),
            ("Don't ask again".to_string(), format!("sltp:skip:{}", position.base)),
        ];
        self.notifier.send_message(&text, Some(buttons), Some(&position.base)).await?;
        Ok(())
    }

    /// `spec.md` §4.11 step 3: orphaned protective orders and incomplete OCO
    /// groups, reported as one consolidated alert.
    async fn report_oco_integrity_issues(&self, live_orders: &[Order]) {
        let mut issues = Vec::new();

        for order in live_orders.iter().filter(|o| o.is_protective() && o.status.is_active()) {
            if order.parent_order_id.is_none() || order.oco_group_id.is_none() {
                issues.push(OcoIntegrityIssue {
                    order_id: order.exchange_order_id.clone(),
                    symbol: order.symbol.clone(),
                    description: "orphaned protective order: missing parent_order_id or oco_group_id".to_string(),
                });
            }
        }

        let mut groups: std::collections::HashMap<String, Vec<&Order>> = std::collections::HashMap::new();
        for order in live_orders.iter().filter(|o| o.is_protective() && o.status.is_active()) {
            if let Some(group) = &order.oco_group_id {
                groups.entry(group.clone()).or_default().push(order);
            }
        }
        for (group, members) in groups {
            let has_sl = members.iter().any(|o| is_stop_loss(o));
            let has_tp = members.iter().any(|o| matches!(o.order_role, Some(OrderRole::TakeProfit)));
            if has_sl != has_tp {
                let symbol = members.first().map(|o| o.symbol.clone()).unwrap_or_default();
                issues.push(OcoIntegrityIssue {
                    order_id: group,
                    symbol,
                    description: "incomplete OCO group: only one of SL/TP active".to_string(),
                });
            }
        }

        if issues.is_empty() {
            return;
        }

        info!(count = issues.len(), "oco integrity issues found");
        let text = issues
            .iter()
            .map(|i| format!("{} ({}): {}", i.symbol, i.order_id, i.description))
            .collect::<Vec<_>>()
            .join("\n");
        let _ = self
            .notifier
            .send_message(&format!("OCO integrity issues:\n{text}"), None, None)
            .await;
    }
}

/// `spec.md` §4.11 step 1: `STOP_LIMIT` carries the SL role; a plain `LIMIT`
/// SELL with a trigger price also counts as SL (stop-market emulation).
fn is_stop_loss(order: &Order) -> bool {
    matches!(order.order_role, Some(OrderRole::StopLoss))
        || (order.side == OrderSide::Sell
            && order.order_type == crate::domain::trading::types::OrderType::Limit
            && order.trigger_price.is_some())
}

fn quantity_within_balance_tolerance(order_qty: Decimal, balance: Decimal) -> bool {
    if balance.is_zero() {
        return false;
    }
    let diff = (order_qty - balance).abs() / balance;
    diff <= QUANTITY_MATCH_TOLERANCE
}
