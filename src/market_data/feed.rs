use std::collections::HashMap;

use anyhow::Result;
use rust_decimal::Decimal;

/// Unit prices keyed by feed id, then by lower-case quote currency:
/// `{"bitcoin": {"idr": 1050000000}}`.
pub type PriceTable = HashMap<String, HashMap<String, Decimal>>;

/// An external source of spot prices.
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    /// Fetch current prices for `feed_ids` quoted in `vs_currency`.
    ///
    /// Ids the upstream does not know are simply absent from the table.
    async fn fetch_prices(&self, feed_ids: &[String], vs_currency: &str) -> Result<PriceTable>;

    fn name(&self) -> &str;
}
