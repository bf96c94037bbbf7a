//! Fail-fast gate pipeline (`spec.md` §4.7), grounded in the donor's
//! `RiskValidationPipeline`: gates are sorted by priority and evaluated in
//! order, returning on the first rejection.

use crate::domain::guardrails::context::{
    GuardrailContext, GuardrailDecision, PlacementKind, TradeMode,
};
use crate::domain::guardrails::gate::Gate;
use crate::domain::guardrails::gates::{
    BalancePrecheckGate, ConfigPresentGate, CreationLockGate, GlobalExposureGate,
    LiveTradingGate, PerBaseExposureGate, PortfolioValueCapGate, PriceChangeGate,
    RecentOrderCooldownGate, StaleSnapshotGate,
};

pub struct GuardrailPipeline {
    gates: Vec<Box<dyn Gate>>,
}

impl GuardrailPipeline {
    pub fn new(mut gates: Vec<Box<dyn Gate>>) -> Self {
        gates.sort_by_key(|g| g.priority());
        Self { gates }
    }

    /// The full G1-G8 ladder plus the dry-run and staleness supplements
    /// (`spec.md` §4.7, `SPEC_FULL.md` §2.1).
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(StaleSnapshotGate),
            Box::new(LiveTradingGate),
            Box::new(CreationLockGate),
            Box::new(RecentOrderCooldownGate),
            Box::new(PerBaseExposureGate),
            Box::new(GlobalExposureGate),
            Box::new(PriceChangeGate),
            Box::new(PortfolioValueCapGate),
            Box::new(ConfigPresentGate),
            Box::new(BalancePrecheckGate),
        ])
    }

    pub fn list_active_gates(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Evaluates every applicable gate for `kind`, in priority order, stopping
    /// at the first rejection. `suggested_mode` starts from the watchlist
    /// item's configured mode and is downgraded to SPOT when the symbol is
    /// within its 609 margin lockout window (`spec.md` §4.7: "suggestedMode may
    /// be downgraded to SPOT if the symbol is within its error-609 lockout
    /// window").
    pub fn evaluate(&self, ctx: &GuardrailContext, kind: PlacementKind) -> GuardrailDecision {
        for gate in &self.gates {
            if !gate.applies_to(kind) {
                continue;
            }
            if let crate::domain::guardrails::context::GateOutcome::Reject(reason) =
                gate.evaluate(ctx)
            {
                return GuardrailDecision {
                    allowed: false,
                    reason: Some(reason),
                    suggested_mode: self.resolve_mode(ctx),
                };
            }
        }

        GuardrailDecision {
            allowed: true,
            reason: None,
            suggested_mode: self.resolve_mode(ctx),
        }
    }

    fn resolve_mode(&self, ctx: &GuardrailContext) -> TradeMode {
        if ctx.margin_locked_609 {
            TradeMode::Spot
        } else if ctx.watchlist_item.trade_on_margin {
            TradeMode::Margin
        } else {
            TradeMode::Spot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guardrails::context::PortfolioSnapshot;
    use crate::domain::trading::types::{SltpMode, WatchlistItem};
    use rust_decimal_macros::dec;

    fn item() -> WatchlistItem {
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

    fn snapshot(now: i64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            as_of: now,
            open_positions_for_base: 0,
            total_open_positions: 0,
            portfolio_value_for_symbol: dec!(0),
            available_balance_usd: dec!(1000),
            daily_notional_placed_usd: dec!(0),
        }
    }

    fn base_ctx<'a>(wi: &'a WatchlistItem, snap: &'a PortfolioSnapshot) -> GuardrailContext<'a> {
        GuardrailContext {
            watchlist_item: wi,
            current_price: dec!(0.5),
            current_time_ms: snap.as_of,
            snapshot: snap,
            has_recent_buy_within_cooldown: false,
            last_order_price: None,
            creation_lock_held: false,
            margin_locked_609: false,
            live_trading: true,
            max_open_per_symbol: 3,
            max_open_global: 100,
            max_snapshot_age_ms: 30_000,
            recent_order_cooldown_ms: 300_000,
        }
    }

    #[test]
    fn happy_path_allows_entry() {
        let pipeline = GuardrailPipeline::standard();
        let wi = item();
        let snap = snapshot(1_000);
        let ctx = base_ctx(&wi, &snap);
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        assert!(decision.allowed);
    }

    #[test]
    fn exposure_cap_blocks_with_reason() {
        let pipeline = GuardrailPipeline::standard();
        let wi = item();
        let mut snap = snapshot(1_000);
        snap.open_positions_for_base = 3;
        let ctx = base_ctx(&wi, &snap);
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("per_base_exposure_cap"));
    }

    #[test]
    fn protective_placement_bypasses_entry_only_gates() {
        let pipeline = GuardrailPipeline::standard();
        let wi = item();
        let mut snap = snapshot(1_000);
        // Would fail G3/G7/G8 if they applied; protective must ignore them.
        snap.open_positions_for_base = 10;
        let mut ctx = base_ctx(&wi, &snap);
        ctx.watchlist_item = &wi;
        let decision = pipeline.evaluate(&ctx, PlacementKind::Protective);
        assert!(decision.allowed);
    }

    #[test]
    fn stale_snapshot_blocks_entry() {
        let pipeline = GuardrailPipeline::standard();
        let wi = item();
        let snap = snapshot(0);
        let mut ctx = base_ctx(&wi, &snap);
        ctx.current_time_ms = 100_000;
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("STALE_SNAPSHOT"));
    }

    #[test]
    fn mode_downgrades_to_spot_when_609_locked() {
        let pipeline = GuardrailPipeline::standard();
        let mut wi = item();
        wi.trade_on_margin = true;
        let snap = snapshot(1_000);
        let mut ctx = base_ctx(&wi, &snap);
        ctx.margin_locked_609 = true;
        let decision = pipeline.evaluate(&ctx, PlacementKind::Entry);
        assert_eq!(decision.suggested_mode, TradeMode::Spot);
    }

    #[test]
    fn list_active_gates_is_priority_ordered() {
        let pipeline = GuardrailPipeline::standard();
        let names = pipeline.list_active_gates();
        assert_eq!(names.first(), Some(&"G_STALE_snapshot"));
    }
}
