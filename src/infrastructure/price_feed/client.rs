//! `PriceFetcher`: the indicator feed (`spec.md` §6). Deliberately out of
//! scope as a *source* — the raw price/indicator computation lives upstream —
//! but the core owns the fallback-through-sources-then-cache contract that
//! feeds `SignalMonitor` and `ExpectedTPEngine`.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::MarketDataError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceWithIndicators {
    pub price: Decimal,
    pub rsi: Decimal,
    pub ma50: Decimal,
    pub ma200: Decimal,
    pub ema10: Decimal,
    pub ma10w: Decimal,
    pub atr: Decimal,
    pub current_volume: Decimal,
    pub avg_volume: Decimal,
}

#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn get_price_with_indicators(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<PriceWithIndicators, MarketDataError>;
}
