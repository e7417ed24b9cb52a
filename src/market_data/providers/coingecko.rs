//! CoinGecko spot price feed.
//!
//! Uses the free `/simple/price` endpoint, which needs no API key and returns
//! every requested coin in a single call.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::market_data::{PriceFeed, PriceTable};

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CoinGeckoFeed {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoFeed {
    /// Creates a feed against the public API with the default 10s timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client))
    }

    /// Creates a feed with a custom reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: COINGECKO_API_BASE.to_string(),
        }
    }

    /// Points the feed at another host, e.g. a mock server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn fetch_prices(&self, feed_ids: &[String], vs_currency: &str) -> Result<PriceTable> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            feed_ids.join(","),
            vs_currency.to_lowercase()
        );
        debug!(url = %url, "requesting CoinGecko simple prices");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("walletbook/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("Failed to fetch prices from CoinGecko")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "CoinGecko simple/price API error: {} - {}",
                status,
                body
            ));
        }

        let table: PriceTable = response
            .json()
            .await
            .context("Failed to decode CoinGecko response")?;
        Ok(table)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
