//! The closed set of currencies the ledger accepts.

use std::collections::BTreeMap;

use crate::models::CurrencyCode;

/// Maps every supported symbol to the price feed's id for it.
///
/// The reference currency is always supported and never has a feed id: it is
/// priced at exactly one against itself.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    reference: CurrencyCode,
    feed_ids: BTreeMap<CurrencyCode, String>,
}

impl CurrencyRegistry {
    pub fn new(
        reference: impl Into<CurrencyCode>,
        feed_ids: impl IntoIterator<Item = (CurrencyCode, String)>,
    ) -> Self {
        let reference = reference.into();
        let feed_ids = feed_ids
            .into_iter()
            .filter(|(symbol, _)| *symbol != reference)
            .collect();
        Self {
            reference,
            feed_ids,
        }
    }

    /// BTC, ETH and USDT against IDR.
    pub fn default_idr() -> Self {
        Self::new("IDR", default_feed_ids())
    }

    pub fn reference(&self) -> &CurrencyCode {
        &self.reference
    }

    pub fn is_reference(&self, currency: &CurrencyCode) -> bool {
        *currency == self.reference
    }

    pub fn is_supported(&self, currency: &CurrencyCode) -> bool {
        self.is_reference(currency) || self.feed_ids.contains_key(currency)
    }

    pub fn feed_id(&self, currency: &CurrencyCode) -> Option<&str> {
        self.feed_ids.get(currency).map(String::as_str)
    }

    /// Every feed id, in symbol order. This is the set requested upstream on
    /// each cache miss.
    pub fn feed_ids(&self) -> Vec<String> {
        self.feed_ids.values().cloned().collect()
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::default_idr()
    }
}

pub fn default_feed_ids() -> BTreeMap<CurrencyCode, String> {
    [("BTC", "bitcoin"), ("ETH", "ethereum"), ("USDT", "tether")]
        .into_iter()
        .map(|(symbol, id)| (CurrencyCode::new(symbol), id.to_string()))
        .collect()
}
