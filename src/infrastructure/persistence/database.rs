use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Singleton database wrapper. Schema per `spec.md` §6: Orders, WatchlistItems,
/// SignalEvents, TelegramMessages (append-only log), TradingSettings.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    pub async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // Orders: one row per exchange_order_id, upserted atomically
        // (spec.md §4.4's "one-row upsert by exchange_order_id must be atomic").
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                exchange_order_id TEXT PRIMARY KEY,
                client_oid TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                order_role TEXT,
                status TEXT NOT NULL,
                price TEXT,
                trigger_price TEXT,
                avg_price TEXT,
                quantity TEXT NOT NULL,
                cumulative_quantity TEXT NOT NULL,
                cumulative_value TEXT NOT NULL,
                parent_order_id TEXT,
                oco_group_id TEXT,
                source TEXT NOT NULL,
                exchange_create_time INTEGER NOT NULL,
                exchange_update_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_symbol_status ON orders (symbol, status);
            CREATE INDEX IF NOT EXISTS idx_orders_oco_group ON orders (oco_group_id);
            CREATE INDEX IF NOT EXISTS idx_orders_parent ON orders (parent_order_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watchlist_items (
                symbol TEXT PRIMARY KEY,
                alert_enabled BOOLEAN NOT NULL DEFAULT 1,
                trade_enabled BOOLEAN NOT NULL DEFAULT 0,
                trade_amount_usd TEXT NOT NULL DEFAULT '0',
                trade_on_margin BOOLEAN NOT NULL DEFAULT 0,
                sl_tp_mode TEXT NOT NULL DEFAULT 'conservative',
                sl_percentage TEXT,
                tp_percentage TEXT,
                min_price_change_pct TEXT NOT NULL DEFAULT '1.0',
                skip_sl_tp_reminder BOOLEAN NOT NULL DEFAULT 0,
                buy_target TEXT,
                purchase_price TEXT,
                is_deleted BOOLEAN NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create watchlist_items table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                state TEXT NOT NULL,
                last_order_price TEXT,
                orders_count INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signal_events_symbol_time
            ON signal_events (symbol, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal_events table")?;

        // Append-only log; never updated or deleted (spec.md §6).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS telegram_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT,
                text TEXT NOT NULL,
                sent_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create telegram_messages table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trading_settings table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
