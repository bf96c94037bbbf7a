use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::application::watchlist_store::{WatchlistStore, WatchlistStoreError};
use crate::domain::trading::types::{SltpMode, WatchlistItem};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteWatchlistStore {
    database: Database,
}

impl SqliteWatchlistStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[derive(sqlx::FromRow)]
struct WatchlistRow {
    symbol: String,
    alert_enabled: bool,
    trade_enabled: bool,
    trade_amount_usd: String,
    trade_on_margin: bool,
    sl_tp_mode: String,
    sl_percentage: Option<String>,
    tp_percentage: Option<String>,
    min_price_change_pct: String,
    skip_sl_tp_reminder: bool,
    buy_target: Option<String>,
    purchase_price: Option<String>,
    is_deleted: bool,
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_default()
}

impl TryFrom<WatchlistRow> for WatchlistItem {
    type Error = WatchlistStoreError;

    fn try_from(row: WatchlistRow) -> Result<Self, Self::Error> {
        let sl_tp_mode = match row.sl_tp_mode.as_str() {
            "conservative" => SltpMode::Conservative,
            "aggressive" => SltpMode::Aggressive,
            other => {
                return Err(WatchlistStoreError::Backend(format!(
                    "unknown sl_tp_mode {other}"
                )))
            }
        };

        Ok(WatchlistItem {
            symbol: row.symbol,
            alert_enabled: row.alert_enabled,
            trade_enabled: row.trade_enabled,
            trade_amount_usd: parse_decimal(&row.trade_amount_usd),
            trade_on_margin: row.trade_on_margin,
            sl_tp_mode,
            sl_percentage: row.sl_percentage.as_deref().map(parse_decimal),
            tp_percentage: row.tp_percentage.as_deref().map(parse_decimal),
            min_price_change_pct: parse_decimal(&row.min_price_change_pct),
            skip_sl_tp_reminder: row.skip_sl_tp_reminder,
            buy_target: row.buy_target.as_deref().map(parse_decimal),
            purchase_price: row.purchase_price.as_deref().map(parse_decimal),
            is_deleted: row.is_deleted,
        })
    }
}

fn sl_tp_mode_str(mode: SltpMode) -> &'static str {
    match mode {
        SltpMode::Conservative => "conservative",
        SltpMode::Aggressive => "aggressive",
    }
}

#[async_trait]
impl WatchlistStore for SqliteWatchlistStore {
    async fn get(&self, symbol: &str) -> Result<Option<WatchlistItem>, WatchlistStoreError> {
        let row: Option<WatchlistRow> = sqlx::query_as("SELECT * FROM watchlist_items WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.database.pool)
            .await
            .map_err(|e| WatchlistStoreError::Backend(e.to_string()))?;
        row.map(WatchlistItem::try_from).transpose()
    }

    async fn upsert(&self, item: WatchlistItem) -> Result<(), WatchlistStoreError> {
        sqlx::query(
            r#"
            INSERT INTO watchlist_items (
                symbol, alert_enabled, trade_enabled, trade_amount_usd, trade_on_margin,
                sl_tp_mode, sl_percentage, tp_percentage, min_price_change_pct,
                skip_sl_tp_reminder, buy_target, purchase_price, is_deleted
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT(symbol) DO UPDATE SET
                alert_enabled = excluded.alert_enabled,
                trade_enabled = excluded.trade_enabled,
                trade_amount_usd = excluded.trade_amount_usd,
                trade_on_margin = excluded.trade_on_margin,
                sl_tp_mode = excluded.sl_tp_mode,
                sl_percentage = excluded.sl_percentage,
                tp_percentage = excluded.tp_percentage,
                min_price_change_pct = excluded.min_price_change_pct,
                skip_sl_tp_reminder = excluded.skip_sl_tp_reminder,
                buy_target = excluded.buy_target,
                purchase_price = excluded.purchase_price,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(&item.symbol)
        .bind(item.alert_enabled)
        .bind(item.trade_enabled)
        .bind(item.trade_amount_usd.to_string())
        .bind(item.trade_on_margin)
        .bind(sl_tp_mode_str(item.sl_tp_mode))
        .bind(item.sl_percentage.map(|p| p.to_string()))
        .bind(item.tp_percentage.map(|p| p.to_string()))
        .bind(item.min_price_change_pct.to_string())
        .bind(item.skip_sl_tp_reminder)
        .bind(item.buy_target.map(|p| p.to_string()))
        .bind(item.purchase_price.map(|p| p.to_string()))
        .bind(item.is_deleted)
        .execute(&self.database.pool)
        .await
        .map_err(|e| WatchlistStoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<WatchlistItem>, WatchlistStoreError> {
        let rows: Vec<WatchlistRow> =
            sqlx::query_as("SELECT * FROM watchlist_items WHERE is_deleted = 0")
                .fetch_all(&self.database.pool)
                .await
                .map_err(|e| WatchlistStoreError::Backend(e.to_string()))?;
        rows.into_iter().map(WatchlistItem::try_from).collect()
    }

    async fn soft_delete(&self, symbol: &str) -> Result<(), WatchlistStoreError> {
        sqlx::query("UPDATE watchlist_items SET is_deleted = 1 WHERE symbol = $1")
            .bind(symbol)
            .execute(&self.database.pool)
            .await
            .map_err(|e| WatchlistStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
