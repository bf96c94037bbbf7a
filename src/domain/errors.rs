use rust_decimal::Decimal;
use thiserror::Error;

/// Fail fast, notify the operator, never retry (`spec.md` §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trade_amount_usd is not configured for {symbol}")]
    MissingAmount { symbol: String },

    #[error("invalid percentage for {symbol}: {field} = {value}")]
    InvalidPercent {
        symbol: String,
        field: &'static str,
        value: Decimal,
    },
}

/// Reject placement before it reaches the exchange (`spec.md` §4.2, §7).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{symbol}: normalized quantity {normalized} below exchange minimum {minimum}")]
    BelowMinQty {
        symbol: String,
        normalized: Decimal,
        minimum: Decimal,
    },

    #[error("{symbol}: notional {notional} below exchange minimum {minimum}")]
    BelowMinNotional {
        symbol: String,
        notional: Decimal,
        minimum: Decimal,
    },

    #[error("{symbol}: exchange has not supplied instrument rules")]
    MetadataUnavailable { symbol: String },
}

/// Errors surfaced by the `ExchangeClient` contract (`spec.md` §4.3, §7). Codes
/// `40101`/`40103` halt placements; `306`/`609` trigger the recovery ladders in
/// `ProtectiveOrderEngine`; `500`/`RateLimited`/`Transient` are retried up to
/// twice with fixed backoff before the tick surrenders to `ExchangeSync`.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("authentication failed (code {code})")]
    AuthFailed { code: u32 },

    #[error("source IP is not whitelisted for this API key")]
    IpNotWhitelisted,

    #[error("rate limited by exchange")]
    RateLimited,

    #[error("transient exchange error: {reason}")]
    Transient { reason: String },

    #[error("insufficient available balance at {leverage}x leverage (306)")]
    InsufficientBalance { leverage: u32 },

    #[error("insufficient margin for {symbol} (609)")]
    InsufficientMargin { symbol: String },

    #[error("exchange server error {status}")]
    ServerError { status: u16 },

    #[error("request to exchange timed out")]
    Timeout,
}

impl ExchangeError {
    /// `spec.md` §7: "Exchange transient (500, RATE_LIMITED, network timeout) —
    /// retry up to 2x with fixed backoff; otherwise surrender this tick".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimited
                | ExchangeError::Transient { .. }
                | ExchangeError::ServerError { .. }
                | ExchangeError::Timeout
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ExchangeError::AuthFailed { .. } | ExchangeError::IpNotWhitelisted
        )
    }
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("no price available for {symbol}")]
    PriceUnavailable { symbol: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_formatting_includes_symbol_and_values() {
        let err = ValidationError::BelowMinQty {
            symbol: "ADA_USDT".to_string(),
            normalized: Decimal::new(5, 0),
            minimum: Decimal::new(10, 0),
        };
        let msg = err.to_string();
        assert!(msg.contains("ADA_USDT"));
        assert!(msg.contains('5'));
        assert!(msg.contains("10"));
    }

    #[test]
    fn exchange_error_classifies_transient_vs_semantic() {
        assert!(ExchangeError::RateLimited.is_transient());
        assert!(ExchangeError::ServerError { status: 500 }.is_transient());
        assert!(!ExchangeError::InsufficientBalance { leverage: 5 }.is_transient());
        assert!(ExchangeError::AuthFailed { code: 40101 }.is_auth_failure());
    }
}
