use crate::domain::guardrails::context::{GateOutcome, GuardrailContext, PlacementKind};

/// One pre-trade admission gate (`spec.md` §4.7). Grounded in the donor's
/// `RiskValidator` trait shape, renamed to this spec's vocabulary since these
/// are admission gates, not post-hoc portfolio-risk validators.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first. Mirrors the donor's `RiskValidator::priority`
    /// convention; `spec.md` §4.7's G1..G8 table ordering is encoded here.
    fn priority(&self) -> i32;

    /// Whether this gate participates for the given placement kind.
    fn applies_to(&self, kind: PlacementKind) -> bool;

    fn evaluate(&self, ctx: &GuardrailContext) -> GateOutcome;
}
