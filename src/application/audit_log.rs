//! Append-only audit trails: `SignalEvents` (every `SignalState` transition,
//! used to reconstruct alert/trade history) and `TelegramMessages` (every
//! outbound alert, for operator audit). Neither table is ever updated or
//! deleted from (`spec.md` §6).

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::trading::types::{OrderSide, Signal};

#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("audit log backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct SignalEventRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub state: Signal,
    pub last_order_price: Option<Decimal>,
    pub orders_count: u64,
    pub timestamp: i64,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_signal_event(&self, event: SignalEventRecord) -> Result<(), AuditLogError>;
    async fn record_telegram_message(
        &self,
        symbol: Option<&str>,
        text: &str,
        sent_at: i64,
    ) -> Result<(), AuditLogError>;
}
