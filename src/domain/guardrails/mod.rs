//! C7 GuardrailEvaluator: a pure decision module combining cooldown,
//! exposure, price-change, portfolio-value, and balance rules (`spec.md`
//! §4.7), grounded in the donor's validator-pipeline pattern.
pub mod context;
pub mod gate;
pub mod gates;
pub mod pipeline;

pub use context::{GateOutcome, GuardrailContext, GuardrailDecision, PlacementKind, PortfolioSnapshot, TradeMode};
pub use gate::Gate;
pub use pipeline::GuardrailPipeline;
