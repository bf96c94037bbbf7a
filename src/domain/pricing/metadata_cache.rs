//! C1: per-symbol exchange trading rules, cached with lazy refresh on a TTL
//! (`spec.md` §4.1). Reads never block on the network; a refresh in flight for
//! one symbol does not block reads or refreshes of any other symbol.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentMetadata {
    pub price_tick_size: Decimal,
    pub quantity_step: Decimal,
    pub min_quantity: Decimal,
    pub min_notional: Decimal,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    pub max_leverage: u32,
}

/// Implemented by the exchange adapter; kept separate from `ExchangeClient` so
/// the pricing domain does not depend on the infrastructure layer.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_instrument_metadata(
        &self,
        symbol: &str,
    ) -> Result<InstrumentMetadata, ValidationError>;
}

struct CacheEntry {
    metadata: InstrumentMetadata,
    fetched_at: Instant,
}

/// `spec.md` §4.1: refreshed lazily on first use and re-fetched on a TTL
/// (default 1 hour) or on a placement error indicating stale metadata.
pub struct InstrumentMetadataCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    refresh_guards: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    ttl: Duration,
}

impl InstrumentMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            refresh_guards: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(3600))
    }

    async fn guard_for(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut guards = self.refresh_guards.lock().await;
        guards
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }

    /// Returns cached metadata when fresh; otherwise fetches via `source` behind
    /// a per-symbol refresh guard so concurrent callers for the same symbol
    /// converge on a single in-flight fetch.
    pub async fn get(
        &self,
        symbol: &str,
        source: &dyn MetadataSource,
    ) -> Result<InstrumentMetadata, ValidationError> {
        if let Some(entry) = self.entries.read().await.get(symbol)
            && self.is_fresh(entry)
        {
            return Ok(entry.metadata);
        }

        let guard = self.guard_for(symbol).await;
        let _permit = guard.lock().await;

        // Another caller may have refreshed while we waited for the guard.
        if let Some(entry) = self.entries.read().await.get(symbol)
            && self.is_fresh(entry)
        {
            return Ok(entry.metadata);
        }

        let metadata = source.fetch_instrument_metadata(symbol).await?;
        self.entries.write().await.insert(
            symbol.to_string(),
            CacheEntry {
                metadata,
                fetched_at: Instant::now(),
            },
        );
        Ok(metadata)
    }

    /// Forces the next `get` to bypass a stale-but-not-yet-expired entry, used
    /// when a placement error indicates the cached rules no longer match the
    /// exchange (`spec.md` §4.1).
    pub async fn invalidate(&self, symbol: &str) {
        self.entries.write().await.remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        metadata: InstrumentMetadata,
    }

    #[async_trait]
    impl MetadataSource for CountingSource {
        async fn fetch_instrument_metadata(
            &self,
            _symbol: &str,
        ) -> Result<InstrumentMetadata, ValidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.metadata)
        }
    }

    fn sample_metadata() -> InstrumentMetadata {
        InstrumentMetadata {
            price_tick_size: Decimal::new(1, 4),
            quantity_step: Decimal::new(1, 2),
            min_quantity: Decimal::new(1, 0),
            min_notional: Decimal::new(10, 0),
            price_decimals: 4,
            quantity_decimals: 2,
            max_leverage: 10,
        }
    }

    #[tokio::test]
    async fn refetches_only_once_per_ttl_window() {
        let cache = InstrumentMetadataCache::new(Duration::from_secs(60));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            metadata: sample_metadata(),
        };

        cache.get("ADA_USDT", &source).await.unwrap();
        cache.get("ADA_USDT", &source).await.unwrap();
        cache.get("ADA_USDT", &source).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = InstrumentMetadataCache::new(Duration::from_secs(60));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            metadata: sample_metadata(),
        };

        cache.get("ADA_USDT", &source).await.unwrap();
        cache.invalidate("ADA_USDT").await;
        cache.get("ADA_USDT", &source).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ttl_expiry_triggers_refresh() {
        let cache = InstrumentMetadataCache::new(Duration::from_millis(10));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            metadata: sample_metadata(),
        };

        cache.get("ADA_USDT", &source).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.get("ADA_USDT", &source).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_symbols_cache_independently() {
        let cache = InstrumentMetadataCache::new(Duration::from_secs(60));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            metadata: sample_metadata(),
        };

        cache.get("ADA_USDT", &source).await.unwrap();
        cache.get("SOL_USDT", &source).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
