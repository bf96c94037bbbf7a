use rust_decimal::Decimal;

use crate::domain::guardrails::context::{GateOutcome, GuardrailContext, PlacementKind};
use crate::domain::guardrails::gate::Gate;

/// G1 — must not already hold an order-creation lock for the symbol (default
/// 10 s).
pub struct CreationLockGate;

impl Gate for CreationLockGate {
    fn name(&self) -> &'static str {
        "G1_global_cooldown"
    }
    fn priority(&self) -> i32 {
        10
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        if ctx.creation_lock_held {
            GateOutcome::Reject("order_creation_locked".to_string())
        } else {
            GateOutcome::Pass
        }
    }
}

/// G2 — no BUY order for the symbol within the last 5 minutes, resolved from
/// `OrderStore`.
pub struct RecentOrderCooldownGate;

impl Gate for RecentOrderCooldownGate {
    fn name(&self) -> &'static str {
        "G2_recent_order_cooldown"
    }
    fn priority(&self) -> i32 {
        20
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        if ctx.has_recent_buy_within_cooldown {
            GateOutcome::Reject("recent_order_cooldown".to_string())
        } else {
            GateOutcome::Pass
        }
    }
}

/// G3 — per-base exposure cap, `open_positions_for_base < MAX_OPEN_PER_SYMBOL`.
pub struct PerBaseExposureGate;

impl Gate for PerBaseExposureGate {
    fn name(&self) -> &'static str {
        "G3_per_base_exposure_cap"
    }
    fn priority(&self) -> i32 {
        30
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        if ctx.snapshot.open_positions_for_base >= ctx.max_open_per_symbol {
            GateOutcome::Reject("per_base_exposure_cap".to_string())
        } else {
            GateOutcome::Pass
        }
    }
}

/// G4 — global exposure cap. `spec.md` §4.7: "informational; configurable —
/// the current ruleset blocks by per-base only" — so this gate is computed and
/// reported but never rejects, matching Open Question (b) in `spec.md` §9,
/// resolved in `DESIGN.md`.
pub struct GlobalExposureGate;

impl Gate for GlobalExposureGate {
    fn name(&self) -> &'static str {
        "G4_global_exposure_cap"
    }
    fn priority(&self) -> i32 {
        40
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, _ctx: &GuardrailContext) -> GateOutcome {
        GateOutcome::Pass
    }
}

/// G5 — if `last_order_price > 0`, require `|current - last| / last * 100 >=
/// min_price_change_pct`. Applies even after the cooldown has expired.
pub struct PriceChangeGate;

impl Gate for PriceChangeGate {
    fn name(&self) -> &'static str {
        "G5_price_change_requirement"
    }
    fn priority(&self) -> i32 {
        50
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        match ctx.last_order_price {
            Some(last) if last > Decimal::ZERO => {
                let pct_change = ((ctx.current_price - last) / last).abs() * Decimal::from(100);
                if pct_change >= ctx.watchlist_item.min_price_change_pct {
                    GateOutcome::Pass
                } else {
                    GateOutcome::Reject("price_change_insufficient".to_string())
                }
            }
            _ => GateOutcome::Pass,
        }
    }
}

/// G6 — current portfolio value for the symbol must not exceed
/// `3 * trade_amount_usd`.
pub struct PortfolioValueCapGate;

impl Gate for PortfolioValueCapGate {
    fn name(&self) -> &'static str {
        "G6_portfolio_value_cap"
    }
    fn priority(&self) -> i32 {
        60
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        let cap = ctx.watchlist_item.trade_amount_usd * Decimal::from(3);
        if ctx.snapshot.portfolio_value_for_symbol > cap {
            GateOutcome::Reject("portfolio_value_cap_exceeded".to_string())
        } else {
            GateOutcome::Pass
        }
    }
}

/// G7 — `trade_amount_usd > 0`, else `CONFIG_MISSING_AMOUNT`.
pub struct ConfigPresentGate;

impl Gate for ConfigPresentGate {
    fn name(&self) -> &'static str {
        "G7_config_present"
    }
    fn priority(&self) -> i32 {
        70
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        if ctx.watchlist_item.trade_amount_usd > Decimal::ZERO {
            GateOutcome::Pass
        } else {
            GateOutcome::Reject("CONFIG_MISSING_AMOUNT".to_string())
        }
    }
}

/// G8 — SPOT balance pre-check: `available_usd >= trade_amount_usd * 1.10`.
/// Skipped for MARGIN (the exchange computes cross-collateral margin).
pub struct BalancePrecheckGate;

impl Gate for BalancePrecheckGate {
    fn name(&self) -> &'static str {
        "G8_balance_precheck"
    }
    fn priority(&self) -> i32 {
        80
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        if ctx.watchlist_item.trade_on_margin {
            return GateOutcome::Pass;
        }
        let required = ctx.watchlist_item.trade_amount_usd * Decimal::new(110, 2);
        if ctx.snapshot.available_balance_usd >= required {
            GateOutcome::Pass
        } else {
            GateOutcome::Reject("insufficient_balance".to_string())
        }
    }
}

/// G-LIVE (`SPEC_FULL.md` §2.1) — dry-run short-circuit shared by entry and
/// protective placements. When `LIVE_TRADING=false`, this gate always passes;
/// the caller downstream swaps in the dry-run `ExchangeClient` path instead of
/// rejecting, matching the original's synthetic `dry_run_` response shape.
pub struct LiveTradingGate;

impl Gate for LiveTradingGate {
    fn name(&self) -> &'static str {
        "G_LIVE_dry_run_awareness"
    }
    fn priority(&self) -> i32 {
        5
    }
    fn applies_to(&self, _kind: PlacementKind) -> bool {
        true
    }
    fn evaluate(&self, _ctx: &GuardrailContext) -> GateOutcome {
        GateOutcome::Pass
    }
}

/// G-STALE (`SPEC_FULL.md` §2.1) — rejects when the portfolio snapshot is
/// older than the configured staleness limit, supplementing G8.
pub struct StaleSnapshotGate;

impl Gate for StaleSnapshotGate {
    fn name(&self) -> &'static str {
        "G_STALE_snapshot"
    }
    fn priority(&self) -> i32 {
        1
    }
    fn applies_to(&self, kind: PlacementKind) -> bool {
        kind == PlacementKind::Entry
    }
    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome {
        let age = ctx.current_time_ms - ctx.snapshot.as_of;
        if age > ctx.max_snapshot_age_ms {
            GateOutcome::Reject("STALE_SNAPSHOT".to_string())
        } else {
            GateOutcome::Pass
        }
    }
}
