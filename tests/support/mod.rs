#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use walletbook::ledger::LedgerService;
use walletbook::market_data::{
    CurrencyRegistry, MemoryKeyValueCache, PriceCache, PriceFeed, PriceResolver, PriceTable,
};
use walletbook::models::{CurrencyCode, Id, NewTransaction, OwnerId, Transaction, Wallet};
use walletbook::portfolio::PortfolioService;
use walletbook::storage::{LedgerScope, LedgerStore, MemoryLedgerStore};

/// In-process price feed with a fixed IDR table and a failure switch.
pub struct ScriptedFeed {
    prices: HashMap<String, Decimal>,
    down: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(id, price)| (id.to_string(), *price))
                .collect(),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for ScriptedFeed {
    async fn fetch_prices(&self, feed_ids: &[String], vs_currency: &str) -> Result<PriceTable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(anyhow!("price feed returned 503 Service Unavailable"));
        }
        Ok(feed_ids
            .iter()
            .filter_map(|id| {
                self.prices.get(id).map(|price| {
                    (
                        id.clone(),
                        HashMap::from([(vs_currency.to_string(), *price)]),
                    )
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn resolver(feed: Arc<dyn PriceFeed>) -> Arc<PriceResolver> {
    let cache = PriceCache::new(feed, Arc::new(MemoryKeyValueCache::new()), "idr");
    Arc::new(PriceResolver::new(
        Arc::new(CurrencyRegistry::default()),
        Arc::new(cache),
    ))
}

pub struct Harness {
    pub store: Arc<dyn LedgerStore>,
    pub feed: Arc<ScriptedFeed>,
    pub ledger: Arc<LedgerService>,
    pub portfolio: PortfolioService,
}

impl Harness {
    pub fn with_store(store: Arc<dyn LedgerStore>, feed: ScriptedFeed) -> Self {
        let feed = Arc::new(feed);
        let prices = resolver(feed.clone());
        Self {
            ledger: Arc::new(LedgerService::new(store.clone(), prices.clone())),
            portfolio: PortfolioService::new(store.clone(), prices),
            store,
            feed,
        }
    }

    pub fn in_memory(feed: ScriptedFeed) -> Self {
        Self::with_store(Arc::new(MemoryLedgerStore::new()), feed)
    }

    pub async fn balance(&self, owner: &str, currency: &str) -> Result<Option<Decimal>> {
        Ok(self
            .store
            .find_wallet(&OwnerId::from(owner), &CurrencyCode::new(currency))
            .await?
            .map(|w| w.balance))
    }
}

/// Delegates to an inner store, but scopes refuse to append transactions
/// while `fail_appends` is set.
pub struct FaultyStore {
    inner: Arc<dyn LedgerStore>,
    pub fail_appends: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner,
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct FaultyScope {
    inner: Box<dyn LedgerScope>,
    fail_appends: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>> {
        Ok(Box::new(FaultyScope {
            inner: self.inner.begin().await?,
            fail_appends: self.fail_appends.clone(),
        }))
    }

    async fn find_wallet(&self, owner: &OwnerId, currency: &CurrencyCode) -> Result<Option<Wallet>> {
        self.inner.find_wallet(owner, currency).await
    }

    async fn list_wallets(&self, owner: &OwnerId) -> Result<Vec<Wallet>> {
        self.inner.list_wallets(owner).await
    }

    async fn list_transactions(
        &self,
        owner: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.inner.list_transactions(owner, limit, offset).await
    }

    async fn count_transactions(&self, owner: &OwnerId) -> Result<usize> {
        self.inner.count_transactions(owner).await
    }
}

#[async_trait]
impl LedgerScope for FaultyScope {
    async fn find_wallet(
        &mut self,
        owner: &OwnerId,
        currency: &CurrencyCode,
    ) -> Result<Option<Wallet>> {
        self.inner.find_wallet(owner, currency).await
    }

    async fn create_wallet(&mut self, owner: &OwnerId, currency: &CurrencyCode) -> Result<Wallet> {
        self.inner.create_wallet(owner, currency).await
    }

    async fn set_balance(&mut self, wallet_id: &Id, balance: Decimal) -> Result<()> {
        self.inner.set_balance(wallet_id, balance).await
    }

    async fn append_transaction(&mut self, tx: NewTransaction) -> Result<Transaction> {
        if self.fail_appends.load(Ordering::SeqCst) {
            bail!("disk full while appending transaction");
        }
        self.inner.append_transaction(tx).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }
}
