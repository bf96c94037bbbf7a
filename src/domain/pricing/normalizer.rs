//! C2: pure, deterministic rounding of prices/quantities to exchange-valid
//! values (`spec.md` §4.2). Exact decimal arithmetic throughout — never a
//! binary float — so the small-position and min-notional boundaries are exact.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use crate::domain::errors::ValidationError;
use crate::domain::pricing::metadata_cache::InstrumentMetadata;
use crate::domain::trading::types::OrderRole;

/// Which role a price is being normalized for, controlling rounding direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRole {
    Entry,
    StopLoss,
    TakeProfit,
}

impl From<OrderRole> for PriceRole {
    fn from(role: OrderRole) -> Self {
        match role {
            OrderRole::StopLoss => PriceRole::StopLoss,
            OrderRole::TakeProfit => PriceRole::TakeProfit,
        }
    }
}

pub struct PriceNormalizer;

impl PriceNormalizer {
    /// Rounds `raw` to a multiple of `step`, in the given direction. `step` must
    /// be positive.
    fn round_to_step(raw: Decimal, step: Decimal, strategy: RoundingStrategy) -> Decimal {
        if step.is_zero() {
            return raw;
        }
        let units = (raw / step).round_dp_with_strategy(0, strategy);
        units * step
    }

    /// `spec.md` §4.2: "rounds to priceTickSize using direction: TAKE_PROFIT ->
    /// round up, STOP_LOSS -> round down, entries -> round to nearest (tie-break
    /// up)". Preserves the exact tick granularity; callers format with
    /// `metadata.price_decimals` for display.
    pub fn normalize_price(raw: Decimal, role: PriceRole, metadata: &InstrumentMetadata) -> Decimal {
        let step = metadata.price_tick_size;
        let strategy = match role {
            PriceRole::TakeProfit => RoundingStrategy::ToPositiveInfinity,
            PriceRole::StopLoss => RoundingStrategy::ToNegativeInfinity,
            PriceRole::Entry => RoundingStrategy::MidpointAwayFromZero,
        };
        Self::round_to_step(raw, step, strategy).round_dp(metadata.price_decimals)
    }

    /// `spec.md` §4.2: floors to `quantityStep`; fails `BELOW_MIN_QTY` if the
    /// result is below `minQuantity`, else `BELOW_MIN_NOTIONAL` if
    /// `normalized * refPrice < minNotional`.
    pub fn normalize_quantity(
        symbol: &str,
        raw: Decimal,
        ref_price: Decimal,
        metadata: &InstrumentMetadata,
    ) -> Result<Decimal, ValidationError> {
        let normalized = Self::round_to_step(
            raw,
            metadata.quantity_step,
            RoundingStrategy::ToNegativeInfinity,
        )
        .round_dp(metadata.quantity_decimals);

        if normalized < metadata.min_quantity {
            return Err(ValidationError::BelowMinQty {
                symbol: symbol.to_string(),
                normalized,
                minimum: metadata.min_quantity,
            });
        }

        let notional = normalized * ref_price;
        if notional < metadata.min_notional {
            return Err(ValidationError::BelowMinNotional {
                symbol: symbol.to_string(),
                notional,
                minimum: metadata.min_notional,
            });
        }

        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> InstrumentMetadata {
        InstrumentMetadata {
            price_tick_size: dec!(0.001),
            quantity_step: dec!(0.1),
            min_quantity: dec!(1.0),
            min_notional: dec!(10.0),
            price_decimals: 3,
            quantity_decimals: 1,
            max_leverage: 10,
        }
    }

    #[test]
    fn take_profit_rounds_up_to_tick() {
        let p = PriceNormalizer::normalize_price(dec!(0.5001), PriceRole::TakeProfit, &metadata());
        assert_eq!(p, dec!(0.501));
    }

    #[test]
    fn stop_loss_rounds_down_to_tick() {
        let p = PriceNormalizer::normalize_price(dec!(0.5009), PriceRole::StopLoss, &metadata());
        assert_eq!(p, dec!(0.500));
    }

    #[test]
    fn entry_rounds_to_nearest_tie_break_up() {
        let p = PriceNormalizer::normalize_price(dec!(0.5005), PriceRole::Entry, &metadata());
        assert_eq!(p, dec!(0.501));
    }

    #[test]
    fn quantity_floors_to_step() {
        let q = PriceNormalizer::normalize_quantity("ADA_USDT", dec!(12.37), dec!(1.0), &metadata())
            .unwrap();
        assert_eq!(q, dec!(12.3));
    }

    #[test]
    fn quantity_below_minimum_rejected() {
        let err =
            PriceNormalizer::normalize_quantity("ADA_USDT", dec!(0.5), dec!(1.0), &metadata())
                .unwrap_err();
        assert!(matches!(err, ValidationError::BelowMinQty { .. }));
    }

    #[test]
    fn quantity_below_min_notional_rejected() {
        let err =
            PriceNormalizer::normalize_quantity("ADA_USDT", dec!(5.0), dec!(1.0), &metadata())
                .unwrap_err();
        assert!(matches!(err, ValidationError::BelowMinNotional { .. }));
    }

    #[test]
    fn price_normalizer_is_idempotent() {
        // P7: normalizing twice is a no-op.
        let once = PriceNormalizer::normalize_price(dec!(0.50049), PriceRole::TakeProfit, &metadata());
        let twice = PriceNormalizer::normalize_price(once, PriceRole::TakeProfit, &metadata());
        assert_eq!(once, twice);
    }
}
