use rust_decimal::Decimal;

use crate::domain::trading::types::WatchlistItem;

/// Which flavor of placement a `GuardrailContext` is being evaluated for.
/// Protective (SL/TP) placements bypass most entry-only gates (`spec.md`
/// §4.7: "SL/TP placements bypass G2, G5, G6, G7, and the daily-limit/USD-limit
/// gates").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    Entry,
    Protective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeMode {
    Spot,
    Margin,
}

/// A point-in-time view of portfolio/order state the evaluator reasons over.
/// Everything here must be resolved from durable state (`OrderStore`, the
/// portfolio cache) rather than trusted in-process memory, per `spec.md`
/// §4.7/§9's field-scan priority-selection note and the original's
/// `portfolio_cache.py` staleness rule (`SPEC_FULL.md` §2.1).
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    /// When this snapshot was captured (unix millis).
    pub as_of: i64,
    pub open_positions_for_base: u32,
    pub total_open_positions: u32,
    pub portfolio_value_for_symbol: Decimal,
    pub available_balance_usd: Decimal,
    pub daily_notional_placed_usd: Decimal,
}

/// Inputs to one guardrail evaluation (`spec.md` §4.7).
pub struct GuardrailContext<'a> {
    pub watchlist_item: &'a WatchlistItem,
    pub current_price: Decimal,
    pub current_time_ms: i64,
    pub snapshot: &'a PortfolioSnapshot,
    /// Resolved from `OrderStore`, not in-memory `SignalState` (`spec.md` §4.7
    /// G2: "resolved from OrderStore, not memory").
    pub has_recent_buy_within_cooldown: bool,
    pub last_order_price: Option<Decimal>,
    pub creation_lock_held: bool,
    pub margin_locked_609: bool,
    pub live_trading: bool,
    pub max_open_per_symbol: u32,
    pub max_open_global: u32,
    pub max_snapshot_age_ms: i64,
    pub recent_order_cooldown_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Reject(String),
}

impl GateOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateOutcome::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub suggested_mode: TradeMode,
}
