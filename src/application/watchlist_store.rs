//! Watchlist persistence contract. Not named as a lettered component in
//! `spec.md` §2, but required by every component that reads per-symbol
//! configuration (`GuardrailEvaluator`, `SignalMonitor`, `ProtectiveOrderEngine`).

use async_trait::async_trait;

use crate::domain::trading::types::WatchlistItem;

#[derive(Debug, thiserror::Error)]
pub enum WatchlistStoreError {
    #[error("watchlist store backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<Option<WatchlistItem>, WatchlistStoreError>;
    async fn upsert(&self, item: WatchlistItem) -> Result<(), WatchlistStoreError>;
    async fn list_active(&self) -> Result<Vec<WatchlistItem>, WatchlistStoreError>;
    async fn soft_delete(&self, symbol: &str) -> Result<(), WatchlistStoreError>;
}
