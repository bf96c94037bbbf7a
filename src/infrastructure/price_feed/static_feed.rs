//! Deterministic `PriceFetcher` test double with scriptable readings.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::MarketDataError;
use crate::infrastructure::price_feed::client::{PriceFetcher, PriceWithIndicators};

#[derive(Default)]
pub struct StaticPriceFetcher {
    readings: RwLock<HashMap<String, PriceWithIndicators>>,
}

impl StaticPriceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, symbol: &str, reading: PriceWithIndicators) {
        self.readings.write().await.insert(symbol.to_string(), reading);
    }
}

#[async_trait]
impl PriceFetcher for StaticPriceFetcher {
    async fn get_price_with_indicators(
        &self,
        symbol: &str,
        _interval: &str,
    ) -> Result<PriceWithIndicators, MarketDataError> {
        self.readings
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or(MarketDataError::PriceUnavailable {
                symbol: symbol.to_string(),
            })
    }
}
