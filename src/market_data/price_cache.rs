use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{KeyValueCache, PriceFeed, PriceTable};
use crate::error::PriceError;

/// Key under which the whole price table is cached.
pub const PRICE_CACHE_KEY: &str = "crypto_prices";

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache-aside wrapper around a [`PriceFeed`].
///
/// The full table lives under one key regardless of which ids were asked
/// for: the supported currency set is small and fixed, so any hit is served
/// as is. Entries are never patched; they expire or get cleared wholesale.
pub struct PriceCache {
    feed: Arc<dyn PriceFeed>,
    cache: Arc<dyn KeyValueCache>,
    vs_currency: String,
    ttl: Duration,
    fetch_timeout: Duration,
    /// Held while fetching so concurrent misses share one upstream call.
    fetch_gate: Mutex<()>,
}

impl PriceCache {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        cache: Arc<dyn KeyValueCache>,
        vs_currency: impl Into<String>,
    ) -> Self {
        Self {
            feed,
            cache,
            vs_currency: vs_currency.into().to_lowercase(),
            ttl: DEFAULT_CACHE_DURATION,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fetch_gate: Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Lower-case quote currency every cached price is expressed in.
    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }

    /// Return the cached table, or fetch, cache and return a fresh one.
    ///
    /// A failed fetch writes nothing and is reported exactly once; there are
    /// no retries.
    pub async fn get_prices(&self, feed_ids: &[String]) -> Result<PriceTable, PriceError> {
        if let Some(table) = self.cached().await {
            debug!(key = PRICE_CACHE_KEY, "price cache hit");
            return Ok(table);
        }

        let _gate = self.fetch_gate.lock().await;
        if let Some(table) = self.cached().await {
            debug!(key = PRICE_CACHE_KEY, "price cache filled by concurrent fetch");
            return Ok(table);
        }

        debug!(
            key = PRICE_CACHE_KEY,
            feed = self.feed.name(),
            ids = %feed_ids.join(","),
            "price cache miss, fetching upstream"
        );
        let table = match tokio::time::timeout(
            self.fetch_timeout,
            self.feed.fetch_prices(feed_ids, &self.vs_currency),
        )
        .await
        {
            Ok(Ok(table)) => table,
            Ok(Err(err)) => {
                warn!(feed = self.feed.name(), error = %err, "price fetch failed");
                return Err(PriceError::Fetch(err));
            }
            Err(_) => {
                warn!(
                    feed = self.feed.name(),
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "price fetch timed out"
                );
                return Err(PriceError::Fetch(anyhow::anyhow!(
                    "{} did not respond within {:?}",
                    self.feed.name(),
                    self.fetch_timeout
                )));
            }
        };

        self.store(&table).await;
        Ok(table)
    }

    /// Drop the cached table so the next lookup goes upstream.
    pub async fn clear(&self) -> anyhow::Result<()> {
        let removed = self.cache.delete(PRICE_CACHE_KEY).await?;
        info!(key = PRICE_CACHE_KEY, removed, "price cache cleared");
        Ok(())
    }

    async fn cached(&self) -> Option<PriceTable> {
        let bytes = match self.cache.get(PRICE_CACHE_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = PRICE_CACHE_KEY, error = %err, "price cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(key = PRICE_CACHE_KEY, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn store(&self, table: &PriceTable) {
        let bytes = match serde_json::to_vec(table) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize price table");
                return;
            }
        };
        if let Err(err) = self.cache.set(PRICE_CACHE_KEY, bytes, self.ttl).await {
            warn!(key = PRICE_CACHE_KEY, error = %err, "price cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::MemoryKeyValueCache;
    use anyhow::{anyhow, Result};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFeed {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingFeed {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PriceFeed for CountingFeed {
        async fn fetch_prices(&self, _ids: &[String], vs: &str) -> Result<PriceTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(anyhow!("upstream returned 503"));
            }
            let mut table = PriceTable::new();
            table.insert(
                "ethereum".to_string(),
                HashMap::from([(vs.to_string(), dec!(50000000))]),
            );
            Ok(table)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn ids() -> Vec<String> {
        vec!["ethereum".to_string()]
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() -> Result<()> {
        let feed = Arc::new(CountingFeed::ok());
        let prices = PriceCache::new(feed.clone(), Arc::new(MemoryKeyValueCache::new()), "IDR");

        let first = prices.get_prices(&ids()).await?;
        let second = prices.get_prices(&ids()).await?;

        assert_eq!(first, second);
        assert_eq!(second["ethereum"]["idr"], dec!(50000000));
        assert_eq!(feed.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() -> Result<()> {
        let feed = Arc::new(CountingFeed::failing());
        let kv = Arc::new(MemoryKeyValueCache::new());
        let prices = PriceCache::new(feed.clone(), kv.clone(), "idr");

        assert!(matches!(
            prices.get_prices(&ids()).await,
            Err(PriceError::Fetch(_))
        ));
        assert!(matches!(
            prices.get_prices(&ids()).await,
            Err(PriceError::Fetch(_))
        ));
        assert_eq!(feed.calls(), 2);
        assert!(kv.get(PRICE_CACHE_KEY).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_entry_triggers_refetch() -> Result<()> {
        let feed = Arc::new(CountingFeed::ok());
        let kv = Arc::new(MemoryKeyValueCache::new());
        kv.set(PRICE_CACHE_KEY, b"not json".to_vec(), Duration::from_secs(60))
            .await?;
        let prices = PriceCache::new(feed.clone(), kv, "idr");

        let table = prices.get_prices(&ids()).await?;
        assert_eq!(table["ethereum"]["idr"], dec!(50000000));
        assert_eq!(feed.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn clear_forces_refetch() -> Result<()> {
        let feed = Arc::new(CountingFeed::ok());
        let prices = PriceCache::new(feed.clone(), Arc::new(MemoryKeyValueCache::new()), "idr");

        prices.get_prices(&ids()).await?;
        prices.clear().await?;
        prices.get_prices(&ids()).await?;

        assert_eq!(feed.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn slow_feed_is_cut_off_by_timeout() {
        let feed = Arc::new(CountingFeed::slow(Duration::from_secs(5)));
        let prices = PriceCache::new(feed, Arc::new(MemoryKeyValueCache::new()), "idr")
            .with_fetch_timeout(Duration::from_millis(50));

        let err = prices.get_prices(&ids()).await.unwrap_err();
        assert!(err.to_string().contains("did not respond"));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() -> Result<()> {
        let feed = Arc::new(CountingFeed::slow(Duration::from_millis(50)));
        let prices = Arc::new(PriceCache::new(
            feed.clone(),
            Arc::new(MemoryKeyValueCache::new()),
            "idr",
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let prices = prices.clone();
            handles.push(tokio::spawn(async move { prices.get_prices(&ids()).await }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(feed.calls(), 1);
        Ok(())
    }
}
