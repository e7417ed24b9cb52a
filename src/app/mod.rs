//! Wiring from a [`ResolvedConfig`] to ready-to-use services.

mod config;

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::ledger::LedgerService;
use crate::market_data::providers::CoinGeckoFeed;
use crate::market_data::{FileKeyValueCache, KeyValueCache, PriceCache, PriceFeed, PriceResolver};
use crate::portfolio::PortfolioService;
use crate::storage::{JsonFileLedgerStore, LedgerStore};

pub use config::config_output;

/// Ledger, portfolio and price services sharing one store and one price
/// cache.
pub struct Walletbook {
    pub ledger: LedgerService,
    pub portfolio: PortfolioService,
    pub prices: Arc<PriceResolver>,
}

impl Walletbook {
    /// Production wiring: JSON ledger and file price cache under the data
    /// directory, CoinGecko for prices.
    pub async fn open(config: &ResolvedConfig) -> Result<Self> {
        let feed = CoinGeckoFeed::with_timeout(config.price_feed.timeout)?
            .with_base_url(config.price_feed.base_url.as_str());
        let cache = FileKeyValueCache::new(config.data_dir.join("cache"));
        let store = JsonFileLedgerStore::open(&config.data_dir).await?;

        debug!(
            data_dir = %config.data_dir.display(),
            base_url = %config.price_feed.base_url,
            "opening walletbook"
        );
        Ok(Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(feed),
            Arc::new(cache),
        ))
    }

    pub fn with_parts(
        config: &ResolvedConfig,
        store: Arc<dyn LedgerStore>,
        feed: Arc<dyn PriceFeed>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        let registry = config.registry();
        let price_cache = PriceCache::new(feed, cache, registry.reference().as_str())
            .with_ttl(config.price_feed.cache_duration)
            .with_fetch_timeout(config.price_feed.timeout);
        let prices = Arc::new(PriceResolver::new(
            Arc::new(registry),
            Arc::new(price_cache),
        ));

        Self {
            ledger: LedgerService::new(store.clone(), prices.clone()),
            portfolio: PortfolioService::new(store, prices.clone()),
            prices,
        }
    }
}
