pub mod client;
pub mod crypto_com;
pub mod mock;

pub use client::{AccountBalance, AccountSummary, ExchangeClient, OrderSize, PlacedOrder, Ticker};
pub use crypto_com::CryptoComClient;
pub use mock::MockExchangeClient;

use std::sync::Arc;

use crate::domain::errors::ValidationError;
use crate::domain::pricing::{InstrumentMetadata, MetadataSource};

/// Bridges the infrastructure-level `ExchangeClient` to the domain-level
/// `MetadataSource` so `InstrumentMetadataCache` never depends on
/// `infrastructure` directly (`SPEC_FULL.md` §4 module map).
pub struct ExchangeMetadataSource {
    client: Arc<dyn ExchangeClient>,
}

impl ExchangeMetadataSource {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl MetadataSource for ExchangeMetadataSource {
    async fn fetch_instrument_metadata(
        &self,
        symbol: &str,
    ) -> Result<InstrumentMetadata, ValidationError> {
        self.client
            .get_instrument_metadata(symbol)
            .await
            .map_err(|_| ValidationError::MetadataUnavailable {
                symbol: symbol.to_string(),
            })
    }
}
