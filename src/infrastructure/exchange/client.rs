use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::errors::ExchangeError;
use crate::domain::pricing::InstrumentMetadata;
use crate::domain::trading::types::{Order, OrderSide};

/// A single currency balance line from `getAccountSummary` (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub currency: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
    pub market_value_usd: Option<Decimal>,
    pub haircut: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub accounts: Vec<AccountBalance>,
    pub as_of: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub ask: Decimal,
    pub bid: Decimal,
    pub last: Decimal,
}

/// How an entry's size is expressed when placed.
#[derive(Debug, Clone, Copy)]
pub enum OrderSize {
    NotionalUsd(Decimal),
    Quantity(Decimal),
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub exchange_order_id: String,
    pub status: crate::domain::trading::types::OrderStatus,
    pub avg_price: Option<Decimal>,
    pub cumulative_quantity: Option<Decimal>,
}

/// C3 (external contract, `spec.md` §4.3/§6): wraps the exchange REST API.
/// Implemented by `CryptoComClient` against the real exchange and by
/// `MockExchangeClient` for tests and `LIVE_TRADING=false`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_account_summary(&self) -> Result<AccountSummary, ExchangeError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: OrderSize,
        is_margin: bool,
        leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn place_stop_loss_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
        trigger_price: Decimal,
        ref_price: Decimal,
        is_margin: bool,
        leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn place_take_profit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
        trigger_price: Decimal,
        ref_price: Decimal,
        is_margin: bool,
        leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError>;

    async fn list_open_orders(&self) -> Result<Vec<Order>, ExchangeError>;

    async fn list_trigger_orders(&self) -> Result<Vec<Order>, ExchangeError>;

    async fn list_order_history(
        &self,
        page_size: u32,
        max_pages: u32,
    ) -> Result<Vec<Order>, ExchangeError>;

    async fn get_instrument_metadata(
        &self,
        symbol: &str,
    ) -> Result<InstrumentMetadata, ExchangeError>;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
}
