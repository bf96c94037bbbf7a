//! Deterministic in-memory `ExchangeClient` used by tests and whenever
//! `LIVE_TRADING=false` (`SPEC_FULL.md` §2.1 dry-run convention: ids carry a
//! `dry_run_` prefix and the placed order reports `Filled` immediately).

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::domain::errors::ExchangeError;
use crate::domain::pricing::InstrumentMetadata;
use crate::domain::trading::types::{Order, OrderSide, OrderStatus};
use crate::infrastructure::exchange::client::{
    AccountSummary, ExchangeClient, OrderSize, PlacedOrder, Ticker,
};

pub struct MockExchangeClient {
    next_id: AtomicU64,
    tickers: Mutex<HashMap<String, Ticker>>,
    metadata: Mutex<HashMap<String, InstrumentMetadata>>,
    account: Mutex<AccountSummary>,
    placed: Mutex<Vec<PlacedOrder>>,
    open_orders: Mutex<Vec<Order>>,
    fail_with: Mutex<Option<ExchangeError>>,
    fail_queue: Mutex<Vec<ExchangeError>>,
}

impl Default for MockExchangeClient {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tickers: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
            account: Mutex::new(AccountSummary {
                accounts: Vec::new(),
                as_of: 0,
            }),
            placed: Mutex::new(Vec::new()),
            open_orders: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            fail_queue: Mutex::new(Vec::new()),
        }
    }
}

impl MockExchangeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_ticker(&self, symbol: &str, ticker: Ticker) {
        self.tickers.lock().await.insert(symbol.to_string(), ticker);
    }

    pub async fn set_metadata(&self, symbol: &str, metadata: InstrumentMetadata) {
        self.metadata.lock().await.insert(symbol.to_string(), metadata);
    }

    pub async fn set_account_summary(&self, summary: AccountSummary) {
        *self.account.lock().await = summary;
    }

    pub async fn set_open_orders(&self, orders: Vec<Order>) {
        *self.open_orders.lock().await = orders;
    }

    /// Makes the next fallible call return this error exactly once; used to
    /// exercise 306/609 recovery ladders deterministically in tests.
    pub async fn fail_next_with(&self, error: ExchangeError) {
        *self.fail_with.lock().await = Some(error);
    }

    /// Queues consecutive failures consumed in order, one per fallible call,
    /// before calls start succeeding again. Used to script ladders like the
    /// 306 leverage recovery (10x, 5x, 2x all rejected, 1x succeeds).
    pub async fn fail_next_n_with(&self, errors: Vec<ExchangeError>) {
        let mut queue = self.fail_queue.lock().await;
        let mut errors = errors;
        errors.reverse();
        queue.extend(errors);
    }

    pub async fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.placed.lock().await.clone()
    }

    async fn take_scripted_failure(&self) -> Option<ExchangeError> {
        if let Some(err) = self.fail_with.lock().await.take() {
            return Some(err);
        }
        self.fail_queue.lock().await.pop()
    }

    fn next_dry_run_id(&self) -> String {
        format!("dry_run_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    async fn get_account_summary(&self) -> Result<AccountSummary, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        Ok(self.account.lock().await.clone())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        _side: OrderSide,
        size: OrderSize,
        _is_margin: bool,
        _leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        let fill_price = self
            .tickers
            .lock()
            .await
            .get(symbol)
            .map(|t| t.last)
            .unwrap_or(Decimal::ZERO);
        let qty = match size {
            OrderSize::Quantity(q) => q,
            OrderSize::NotionalUsd(notional) if fill_price > Decimal::ZERO => notional / fill_price,
            OrderSize::NotionalUsd(_) => Decimal::ZERO,
        };
        let order = PlacedOrder {
            exchange_order_id: self.next_dry_run_id(),
            status: OrderStatus::Filled,
            avg_price: Some(fill_price),
            cumulative_quantity: Some(qty),
        };
        self.placed.lock().await.push(order.clone());
        Ok(order)
    }

    async fn place_stop_loss_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        _price: Decimal,
        qty: Decimal,
        _trigger_price: Decimal,
        _ref_price: Decimal,
        _is_margin: bool,
        _leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        let order = PlacedOrder {
            exchange_order_id: self.next_dry_run_id(),
            status: OrderStatus::New,
            avg_price: None,
            cumulative_quantity: Some(qty),
        };
        self.placed.lock().await.push(order.clone());
        Ok(order)
    }

    async fn place_take_profit_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        _price: Decimal,
        qty: Decimal,
        _trigger_price: Decimal,
        _ref_price: Decimal,
        _is_margin: bool,
        _leverage: Option<u32>,
    ) -> Result<PlacedOrder, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        let order = PlacedOrder {
            exchange_order_id: self.next_dry_run_id(),
            status: OrderStatus::New,
            avg_price: None,
            cumulative_quantity: Some(qty),
        };
        self.placed.lock().await.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, _exchange_order_id: &str) -> Result<(), ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        Ok(())
    }

    async fn list_open_orders(&self) -> Result<Vec<Order>, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        Ok(self.open_orders.lock().await.clone())
    }

    async fn list_trigger_orders(&self) -> Result<Vec<Order>, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        Ok(Vec::new())
    }

    async fn list_order_history(
        &self,
        _page_size: u32,
        _max_pages: u32,
    ) -> Result<Vec<Order>, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        Ok(Vec::new())
    }

    async fn get_instrument_metadata(
        &self,
        symbol: &str,
    ) -> Result<InstrumentMetadata, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        self.metadata
            .lock()
            .await
            .get(symbol)
            .cloned()
            .ok_or(ExchangeError::Transient {
                reason: format!("no scripted metadata for {symbol}"),
            })
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        if let Some(err) = self.take_scripted_failure().await {
            return Err(err);
        }
        self.tickers
            .lock()
            .await
            .get(symbol)
            .copied()
            .ok_or(ExchangeError::Transient {
                reason: format!("no scripted ticker for {symbol}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn market_order_fills_immediately_with_dry_run_prefix() {
        let client = MockExchangeClient::new();
        let placed = client
            .place_market_order(
                "ADA_USDT",
                OrderSide::Buy,
                OrderSize::Quantity(dec!(100)),
                false,
                None,
            )
            .await
            .unwrap();
        assert!(placed.exchange_order_id.starts_with("dry_run_"));
        assert_eq!(placed.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn scripted_failure_fires_exactly_once() {
        let client = MockExchangeClient::new();
        client.fail_next_with(ExchangeError::InsufficientMargin {
            symbol: "ADA_USDT".to_string(),
        }).await;

        let first = client.get_account_summary().await;
        assert!(matches!(first, Err(ExchangeError::InsufficientMargin { .. })));

        let second = client.get_account_summary().await;
        assert!(second.is_ok());
    }
}
