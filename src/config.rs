//! Configuration loaded once at start (`spec.md` §6). Re-reading on change is
//! left to `SettingsStore::is_live_trading_enabled`, which consults the
//! database rather than the process environment for `LIVE_TRADING`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub crypto_com_api_key: String,
    pub crypto_com_secret_key: String,
    pub crypto_com_rest_url: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub live_trading: bool,
    pub portfolio_equity_field_override: Option<String>,
    pub max_open_per_symbol: u32,
    pub max_open_global: u32,
    pub min_price_change_pct: Decimal,
    pub alert_cooldown_minutes: i64,
    pub default_configured_leverage: u32,
    pub signal_monitor_interval_secs: u64,
    pub exchange_sync_interval_secs: u64,
    pub sltp_checker_interval_secs: u64,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://sentrytrade.db".to_string());

        let crypto_com_api_key = env::var("CRYPTO_COM_API_KEY").unwrap_or_default();
        let crypto_com_secret_key = env::var("CRYPTO_COM_SECRET_KEY").unwrap_or_default();
        let crypto_com_rest_url = env::var("CRYPTO_COM_REST_URL")
            .unwrap_or_else(|_| "https://api.crypto.com/exchange/v1".to_string());

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let telegram_chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();

        let live_trading = env::var("LIVE_TRADING")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let portfolio_equity_field_override = env::var("PORTFOLIO_EQUITY_FIELD_OVERRIDE").ok();

        let max_open_per_symbol = parse_env("MAX_OPEN_PER_SYMBOL", 3u32)
            .context("failed to parse MAX_OPEN_PER_SYMBOL")?;
        let max_open_global =
            parse_env("MAX_OPEN_GLOBAL", 20u32).context("failed to parse MAX_OPEN_GLOBAL")?;
        let min_price_change_pct = parse_env("MIN_PRICE_CHANGE_PCT", Decimal::ONE)
            .context("failed to parse MIN_PRICE_CHANGE_PCT")?;
        let alert_cooldown_minutes = parse_env("ALERT_COOLDOWN_MINUTES", 5i64)
            .context("failed to parse ALERT_COOLDOWN_MINUTES")?;
        let default_configured_leverage = parse_env("DEFAULT_CONFIGURED_LEVERAGE", 10u32)
            .context("failed to parse DEFAULT_CONFIGURED_LEVERAGE")?;

        let signal_monitor_interval_secs = parse_env("SIGNAL_MONITOR_INTERVAL_SECS", 30u64)?;
        let exchange_sync_interval_secs = parse_env("EXCHANGE_SYNC_INTERVAL_SECS", 30u64)?;
        let sltp_checker_interval_secs = parse_env("SLTP_CHECKER_INTERVAL_SECS", 3600u64)?;

        Ok(Self {
            database_url,
            crypto_com_api_key,
            crypto_com_secret_key,
            crypto_com_rest_url,
            telegram_bot_token,
            telegram_chat_id,
            live_trading,
            portfolio_equity_field_override,
            max_open_per_symbol,
            max_open_global,
            min_price_change_pct,
            alert_cooldown_minutes,
            default_configured_leverage,
            signal_monitor_interval_secs,
            exchange_sync_interval_secs,
            sltp_checker_interval_secs,
        })
    }
}
