use async_trait::async_trait;

use crate::application::audit_log::{AuditLog, AuditLogError, SignalEventRecord};
use crate::infrastructure::persistence::database::Database;

pub struct SqliteAuditLog {
    database: Database,
}

impl SqliteAuditLog {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn record_signal_event(&self, event: SignalEventRecord) -> Result<(), AuditLogError> {
        sqlx::query(
            r#"
            INSERT INTO signal_events (symbol, side, state, last_order_price, orders_count, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.symbol)
        .bind(event.side.to_string())
        .bind(event.state.to_string())
        .bind(event.last_order_price.map(|p| p.to_string()))
        .bind(event.orders_count as i64)
        .bind(event.timestamp)
        .execute(&self.database.pool)
        .await
        .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn record_telegram_message(
        &self,
        symbol: Option<&str>,
        text: &str,
        sent_at: i64,
    ) -> Result<(), AuditLogError> {
        sqlx::query("INSERT INTO telegram_messages (symbol, text, sent_at) VALUES ($1, $2, $3)")
            .bind(symbol)
            .bind(text)
            .bind(sent_at)
            .execute(&self.database.pool)
            .await
            .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{OrderSide, Signal};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn records_signal_events_and_telegram_messages() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        let audit = SqliteAuditLog::new(database);

        audit
            .record_signal_event(SignalEventRecord {
                symbol: "ADA_USDT".to_string(),
                side: OrderSide::Buy,
                state: Signal::Buy,
                last_order_price: Some(dec!(0.5)),
                orders_count: 1,
                timestamp: 1_000,
            })
            .await
            .unwrap();

        audit
            .record_telegram_message(Some("ADA_USDT"), "BUY signal fired", 1_000)
            .await
            .unwrap();
    }
}
