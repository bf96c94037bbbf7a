//! `TradingSettings` persistence: the `LIVE_TRADING` flag gate (`spec.md` §6)
//! plus any other runtime-mutable settings the dashboard toggles without a
//! redeploy.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SettingsStoreError {
    #[error("settings store backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SettingsStoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SettingsStoreError>;

    /// Convenience accessor: `false` unless the row is present and `"true"`.
    async fn is_live_trading_enabled(&self) -> Result<bool, SettingsStoreError> {
        Ok(self.get("LIVE_TRADING").await?.as_deref() == Some("true"))
    }
}
