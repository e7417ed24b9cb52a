use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use super::{CurrencyRegistry, PriceCache};
use crate::error::PriceError;
use crate::models::CurrencyCode;

/// Turns a currency symbol into a unit price in the reference currency.
pub struct PriceResolver {
    registry: Arc<CurrencyRegistry>,
    prices: Arc<PriceCache>,
}

impl PriceResolver {
    pub fn new(registry: Arc<CurrencyRegistry>, prices: Arc<PriceCache>) -> Self {
        Self { registry, prices }
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn price_cache(&self) -> &PriceCache {
        &self.prices
    }

    /// The reference currency short-circuits to one without touching the
    /// cache or the network; unsupported symbols fail before any lookup.
    pub async fn unit_price(&self, currency: &CurrencyCode) -> Result<Decimal, PriceError> {
        if self.registry.is_reference(currency) {
            return Ok(Decimal::ONE);
        }

        let feed_id = self
            .registry
            .feed_id(currency)
            .ok_or_else(|| PriceError::UnsupportedCurrency(currency.clone()))?;

        let table = self.prices.get_prices(&self.registry.feed_ids()).await?;
        let price = table
            .get(feed_id)
            .and_then(|quotes| quotes.get(self.prices.vs_currency()))
            .copied()
            .ok_or_else(|| PriceError::MissingPrice {
                currency: currency.clone(),
                feed_id: feed_id.to_string(),
            })?;

        debug!(currency = %currency, feed_id, price = %price, "resolved unit price");
        Ok(price)
    }
}
