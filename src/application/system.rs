//! Bootstrap and wiring (`spec.md` §5): builds every component and starts the
//! cooperative periodic loops. Mirrors the teacher's `Application::build`/
//! `start` split — `build` wires dependencies, `start` spawns the scheduler.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::audit_log::AuditLog;
use crate::application::exchange_sync::ExchangeSync;
use crate::application::expected_tp_engine::ExpectedTpEngine;
use crate::application::leverage_cache::LeverageCache;
use crate::application::order_store::OrderStore;
use crate::application::protective_order_engine::ProtectiveOrderEngine;
use crate::application::settings_store::SettingsStore;
use crate::application::signal_monitor::SignalMonitor;
use crate::application::sltp_checker::SltpChecker;
use crate::application::watchlist_store::WatchlistStore;
use crate::config::Config;
use crate::domain::alerts::AlertThrottler;
use crate::domain::pricing::InstrumentMetadataCache;
use crate::infrastructure::exchange::{CryptoComClient, ExchangeClient, ExchangeMetadataSource, MockExchangeClient};
use crate::infrastructure::notifier::{Notifier, RecordingNotifier, TelegramNotifier};
use crate::infrastructure::persistence::{Database, SqliteAuditLog, SqliteOrderStore, SqliteSettingsStore, SqliteWatchlistStore};
use crate::infrastructure::price_feed::{CachedPriceFeed, HeuristicSignalClassifier, PriceFetcher, SignalClassifier};

/// Everything the scheduler loops need, held for the process lifetime.
pub struct Application {
    pub config: Config,
    pub order_store: Arc<dyn OrderStore>,
    pub watchlist_store: Arc<dyn WatchlistStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub audit_log: Arc<dyn AuditLog>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub notifier: Arc<dyn Notifier>,
    pub price_feed: Arc<dyn PriceFetcher>,
    pub signal_classifier: Arc<dyn SignalClassifier>,
    pub protective_order_engine: Arc<ProtectiveOrderEngine>,
    pub signal_monitor: Arc<SignalMonitor>,
    pub exchange_sync: Arc<ExchangeSync>,
    pub sltp_checker: Arc<SltpChecker>,
    pub expected_tp_engine: Arc<ExpectedTpEngine>,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(live_trading = config.live_trading, "building application");

        let database = Database::new(&config.database_url).await?;
        database.init().await?;

        let order_store: Arc<dyn OrderStore> = Arc::new(SqliteOrderStore::new(database.clone()));
        let watchlist_store: Arc<dyn WatchlistStore> = Arc::new(SqliteWatchlistStore::new(database.clone()));
        let settings_store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(database.clone()));
        let audit_log: Arc<dyn AuditLog> = Arc::new(SqliteAuditLog::new(database.clone()));

        let exchange: Arc<dyn ExchangeClient> = if config.live_trading {
            Arc::new(CryptoComClient::new(
                config.crypto_com_rest_url.clone(),
                config.crypto_com_api_key.clone(),
                config.crypto_com_secret_key.clone(),
            ))
        } else {
            Arc::new(MockExchangeClient::new())
        };

        let notifier: Arc<dyn Notifier> = if config.telegram_bot_token.is_empty() {
            Arc::new(RecordingNotifier::new())
        } else {
            Arc::new(TelegramNotifier::new(
                config.telegram_bot_token.clone(),
                config.telegram_chat_id.clone(),
            ))
        };

        let price_feed: Arc<dyn PriceFetcher> = Arc::new(CachedPriceFeed::new(Vec::new()));
        let signal_classifier: Arc<dyn SignalClassifier> = Arc::new(HeuristicSignalClassifier);

        let metadata_cache = Arc::new(InstrumentMetadataCache::new(Duration::from_secs(300)));
        let metadata_source = Arc::new(ExchangeMetadataSource::new(exchange.clone()));
        let leverage_cache = Arc::new(LeverageCache::new());

        let protective_order_engine = Arc::new(ProtectiveOrderEngine::new(
            order_store.clone(),
            watchlist_store.clone(),
            exchange.clone(),
            metadata_cache.clone(),
            metadata_source,
            leverage_cache,
        ));

        let throttler = Arc::new(AlertThrottler::new(config.alert_cooldown_minutes * 60 * 1000));

        let signal_monitor = Arc::new(SignalMonitor::new(
            watchlist_store.clone(),
            order_store.clone(),
            exchange.clone(),
            price_feed.clone(),
            signal_classifier.clone(),
            notifier.clone(),
            audit_log.clone(),
            protective_order_engine.clone(),
            throttler,
            config.max_open_per_symbol,
            config.max_open_global,
        ));

        let exchange_sync = Arc::new(ExchangeSync::new(
            order_store.clone(),
            exchange.clone(),
            protective_order_engine.clone(),
        ));

        let sltp_checker = Arc::new(SltpChecker::new(
            order_store.clone(),
            watchlist_store.clone(),
            exchange.clone(),
            notifier.clone(),
        ));

        let expected_tp_engine = Arc::new(ExpectedTpEngine::new(order_store.clone(), exchange.clone()));

        Ok(Self {
            config,
            order_store,
            watchlist_store,
            settings_store,
            audit_log,
            exchange,
            notifier,
            price_feed,
            signal_classifier,
            protective_order_engine,
            signal_monitor,
            exchange_sync,
            sltp_checker,
            expected_tp_engine,
        })
    }

    /// Spawns the three periodic loops. ExpectedTpEngine is read-on-demand
    /// (`spec.md` §5) and has no loop of its own.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!("starting scheduler loops");
        let mut handles = Vec::new();

        let signal_monitor = self.signal_monitor.clone();
        let interval = Duration::from_secs(self.config.signal_monitor_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                signal_monitor.tick().await;
            }
        }));

        let exchange_sync = self.exchange_sync.clone();
        let interval = Duration::from_secs(self.config.exchange_sync_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                exchange_sync.tick().await;
            }
        }));

        let sltp_checker = self.sltp_checker.clone();
        let interval = Duration::from_secs(self.config.sltp_checker_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sltp_checker.sweep().await;
            }
        }));

        handles
    }
}
