//! Falls back through an ordered list of upstream `PriceFetcher` sources and
//! caches the winning reading for ~30 s per `(symbol, interval)` so
//! `SignalMonitor` and `ExpectedTPEngine` ticks never each re-hit the network
//! (`spec.md` §6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use async_trait::async_trait;

use crate::domain::errors::MarketDataError;
use crate::infrastructure::price_feed::client::{PriceFetcher, PriceWithIndicators};

struct CacheEntry {
    reading: PriceWithIndicators,
    fetched_at: Instant,
}

pub struct CachedPriceFeed {
    sources: Vec<Arc<dyn PriceFetcher>>,
    cache: RwLock<HashMap<(String, String), CacheEntry>>,
    ttl: Duration,
}

impl CachedPriceFeed {
    pub fn new(sources: Vec<Arc<dyn PriceFetcher>>) -> Self {
        Self {
            sources,
            cache: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl PriceFetcher for CachedPriceFeed {
    async fn get_price_with_indicators(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<PriceWithIndicators, MarketDataError> {
        let key = (symbol.to_string(), interval.to_string());

        if let Some(entry) = self.cache.read().await.get(&key)
            && entry.fetched_at.elapsed() < self.ttl
        {
            return Ok(entry.reading);
        }

        for source in &self.sources {
            if let Ok(reading) = source.get_price_with_indicators(symbol, interval).await {
                self.cache.write().await.insert(
                    key,
                    CacheEntry {
                        reading,
                        fetched_at: Instant::now(),
                    },
                );
                return Ok(reading);
            }
        }

        Err(MarketDataError::PriceUnavailable {
            symbol: symbol.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSource;

    #[async_trait]
    impl PriceFetcher for FailingSource {
        async fn get_price_with_indicators(
            &self,
            symbol: &str,
            _interval: &str,
        ) -> Result<PriceWithIndicators, MarketDataError> {
            Err(MarketDataError::PriceUnavailable {
                symbol: symbol.to_string(),
            })
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        reading: PriceWithIndicators,
    }

    #[async_trait]
    impl PriceFetcher for CountingSource {
        async fn get_price_with_indicators(
            &self,
            _symbol: &str,
            _interval: &str,
        ) -> Result<PriceWithIndicators, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reading)
        }
    }

    fn sample_reading() -> PriceWithIndicators {
        PriceWithIndicators {
            price: dec!(0.5),
            rsi: dec!(55),
            ma50: dec!(0.48),
            ma200: dec!(0.45),
            ema10: dec!(0.49),
            ma10w: dec!(0.47),
            atr: dec!(0.01),
            current_volume: dec!(1000),
            avg_volume: dec!(900),
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_source_when_first_fails() {
        let counting = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            reading: sample_reading(),
        });
        let feed = CachedPriceFeed::new(vec![Arc::new(FailingSource), counting.clone()]);

        let reading = feed.get_price_with_indicators("ADA_USDT", "1h").await.unwrap();
        assert_eq!(reading.price, dec!(0.5));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caches_within_ttl_window() {
        let counting = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            reading: sample_reading(),
        });
        let feed = CachedPriceFeed::new(vec![counting.clone()]);

        feed.get_price_with_indicators("ADA_USDT", "1h").await.unwrap();
        feed.get_price_with_indicators("ADA_USDT", "1h").await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_bubbles_price_unavailable() {
        let feed = CachedPriceFeed::new(vec![Arc::new(FailingSource)]);
        let err = feed.get_price_with_indicators("ADA_USDT", "1h").await.unwrap_err();
        assert!(matches!(err, MarketDataError::PriceUnavailable { .. }));
    }
}
