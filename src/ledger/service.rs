use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{LedgerReceipt, TransactionHistory};
use crate::error::LedgerError;
use crate::market_data::PriceResolver;
use crate::models::{CurrencyCode, NewTransaction, OwnerId, TransactionKind, Wallet};
use crate::storage::{LedgerScope, LedgerStore};

/// Applies deposits and withdrawals as all-or-nothing units of work.
///
/// Each mutation resolves its audit price first, then opens one exclusive
/// store scope covering the wallet read, the balance write and the
/// transaction append. No network call happens while a scope is open.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceResolver>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, prices: Arc<PriceResolver>) -> Self {
        Self { store, prices }
    }

    pub async fn deposit(
        &self,
        owner: &OwnerId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.validate(currency, amount)?;
        let price_at = self.audit_price(currency).await;

        let mut scope = self.store.begin().await.map_err(LedgerError::Storage)?;
        let wallet = match scope
            .find_wallet(owner, currency)
            .await
            .map_err(LedgerError::Storage)?
        {
            Some(wallet) => wallet,
            None => {
                debug!(owner = %owner, currency = %currency, "creating wallet on first deposit");
                scope
                    .create_wallet(owner, currency)
                    .await
                    .map_err(LedgerError::Storage)?
            }
        };

        let balance = exact(wallet.balance.checked_add(amount), wallet.balance, amount)
            .ok_or_else(|| out_of_range(&wallet, amount))?;
        let receipt = apply(
            scope,
            &wallet,
            balance,
            NewTransaction::new(
                owner.clone(),
                TransactionKind::Deposit,
                currency.clone(),
                amount,
                price_at,
            ),
        )
        .await?;

        info!(
            owner = %owner,
            currency = %currency,
            amount = %amount,
            balance = %receipt.balance,
            transaction_id = %receipt.transaction.id,
            "deposit committed"
        );
        Ok(receipt)
    }

    pub async fn withdraw(
        &self,
        owner: &OwnerId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.validate(currency, amount)?;

        // Cheap rejection against committed state before any price lookup. The
        // authoritative checks run again inside the scope.
        let committed = self
            .store
            .find_wallet(owner, currency)
            .await
            .map_err(LedgerError::Storage)?;
        check_withdrawal(committed.as_ref(), currency, amount)?;

        let price_at = self.audit_price(currency).await;

        let mut scope = self.store.begin().await.map_err(LedgerError::Storage)?;
        let wallet = scope
            .find_wallet(owner, currency)
            .await
            .map_err(LedgerError::Storage)?;
        let wallet = check_withdrawal(wallet.as_ref(), currency, amount)?;

        let balance = exact(wallet.balance.checked_sub(amount), wallet.balance, amount)
            .ok_or_else(|| out_of_range(wallet, amount))?;
        let receipt = apply(
            scope,
            wallet,
            balance,
            NewTransaction::new(
                owner.clone(),
                TransactionKind::Withdraw,
                currency.clone(),
                amount,
                price_at,
            ),
        )
        .await?;

        info!(
            owner = %owner,
            currency = %currency,
            amount = %amount,
            balance = %receipt.balance,
            transaction_id = %receipt.transaction.id,
            "withdrawal committed"
        );
        Ok(receipt)
    }

    /// Every wallet the owner has, zero balances included.
    pub async fn wallets(&self, owner: &OwnerId) -> Result<Vec<Wallet>, LedgerError> {
        self.store
            .list_wallets(owner)
            .await
            .map_err(LedgerError::Storage)
    }

    /// A `limit` of zero returns everything from `offset` on.
    pub async fn history(
        &self,
        owner: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionHistory, LedgerError> {
        let transactions = self
            .store
            .list_transactions(owner, limit, offset)
            .await
            .map_err(LedgerError::Storage)?;
        let total = self
            .store
            .count_transactions(owner)
            .await
            .map_err(LedgerError::Storage)?;
        Ok(TransactionHistory {
            transactions,
            total,
        })
    }

    fn validate(&self, currency: &CurrencyCode, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if !self.prices.registry().is_supported(currency) {
            return Err(LedgerError::UnsupportedCurrency(currency.clone()));
        }
        Ok(())
    }

    /// Price lookups never fail a mutation; `None` is recorded as the zero
    /// placeholder with an unavailable status.
    async fn audit_price(&self, currency: &CurrencyCode) -> Option<Decimal> {
        match self.prices.unit_price(currency).await {
            Ok(price) => Some(price),
            Err(err) => {
                warn!(
                    currency = %currency,
                    error = %err,
                    "price lookup failed, recording transaction without a price"
                );
                None
            }
        }
    }
}

fn check_withdrawal<'a>(
    wallet: Option<&'a Wallet>,
    currency: &CurrencyCode,
    amount: Decimal,
) -> Result<&'a Wallet, LedgerError> {
    let wallet = wallet.ok_or_else(|| LedgerError::WalletNotFound {
        currency: currency.clone(),
    })?;
    if wallet.balance < amount {
        debug!(
            owner = %wallet.owner,
            currency = %currency,
            available = %wallet.balance,
            requested = %amount,
            "withdrawal rejected"
        );
        return Err(LedgerError::InsufficientBalance {
            currency: currency.clone(),
            available: wallet.balance,
            requested: amount,
        });
    }
    Ok(wallet)
}

/// Keeps `result` only if no digits were rounded away. `Decimal` silently
/// lowers the scale when a sum needs more than 28 significant digits.
fn exact(result: Option<Decimal>, lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    result.filter(|r| r.scale() >= lhs.scale().max(rhs.scale()))
}

fn out_of_range(wallet: &Wallet, amount: Decimal) -> LedgerError {
    debug!(
        owner = %wallet.owner,
        currency = %wallet.currency,
        balance = %wallet.balance,
        amount = %amount,
        "amount rejected, balance cannot represent the result"
    );
    LedgerError::AmountOutOfRange {
        currency: wallet.currency.clone(),
    }
}

/// Balance write, transaction append and commit. Returning early on any
/// error drops the scope, which discards both writes.
async fn apply(
    mut scope: Box<dyn LedgerScope>,
    wallet: &Wallet,
    balance: Decimal,
    tx: NewTransaction,
) -> Result<LedgerReceipt, LedgerError> {
    scope
        .set_balance(&wallet.id, balance)
        .await
        .map_err(LedgerError::Storage)?;
    let transaction = scope
        .append_transaction(tx)
        .await
        .map_err(LedgerError::Storage)?;
    scope.commit().await.map_err(LedgerError::Storage)?;
    Ok(LedgerReceipt {
        transaction,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{
        CurrencyRegistry, MemoryKeyValueCache, PriceCache, PriceFeed, PriceTable,
    };
    use crate::models::PriceStatus;
    use crate::storage::MemoryLedgerStore;
    use anyhow::Result;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFeed {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceFeed for StaticFeed {
        async fn fetch_prices(&self, _ids: &[String], vs: &str) -> Result<PriceTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PriceTable::from([(
                "ethereum".to_string(),
                HashMap::from([(vs.to_string(), dec!(50000000))]),
            )]))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn service() -> (LedgerService, Arc<StaticFeed>) {
        let feed = Arc::new(StaticFeed {
            calls: AtomicUsize::new(0),
        });
        let cache = PriceCache::new(feed.clone(), Arc::new(MemoryKeyValueCache::new()), "idr");
        let resolver = PriceResolver::new(Arc::new(CurrencyRegistry::default()), Arc::new(cache));
        (
            LedgerService::new(Arc::new(MemoryLedgerStore::new()), Arc::new(resolver)),
            feed,
        )
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let (ledger, feed) = service();
        let owner = OwnerId::from("user-1");
        let eth = CurrencyCode::new("ETH");

        for amount in [dec!(0), dec!(-1)] {
            assert!(matches!(
                ledger.deposit(&owner, &eth, amount).await,
                Err(LedgerError::InvalidAmount)
            ));
            assert!(matches!(
                ledger.withdraw(&owner, &eth, amount).await,
                Err(LedgerError::InvalidAmount)
            ));
        }
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_unsupported_currency_without_side_effects() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");

        let err = ledger
            .deposit(&owner, &CurrencyCode::new("DOGE"), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedCurrency(_)));
        assert!(ledger.wallets(&owner).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn deposit_records_resolved_price() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");

        let receipt = ledger
            .deposit(&owner, &CurrencyCode::new("eth"), dec!(2.0))
            .await?;

        assert_eq!(receipt.balance, dec!(2.0));
        assert_eq!(receipt.transaction.currency.as_str(), "ETH");
        assert_eq!(receipt.transaction.price_at, dec!(50000000));
        assert_eq!(receipt.transaction.price_status, PriceStatus::Resolved);
        Ok(())
    }

    #[tokio::test]
    async fn reference_currency_is_priced_at_one() -> Result<()> {
        let (ledger, feed) = service();
        let receipt = ledger
            .deposit(&OwnerId::from("user-1"), &CurrencyCode::new("IDR"), dec!(150000))
            .await?;

        assert_eq!(receipt.transaction.price_at, Decimal::ONE);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_feed_quote_records_unavailable_price() -> Result<()> {
        let (ledger, _) = service();
        let receipt = ledger
            .deposit(&OwnerId::from("user-1"), &CurrencyCode::new("USDT"), dec!(25))
            .await?;

        assert_eq!(receipt.transaction.price_at, Decimal::ZERO);
        assert_eq!(receipt.transaction.price_status, PriceStatus::Unavailable);
        Ok(())
    }

    #[tokio::test]
    async fn withdraw_from_unfunded_wallet_skips_price_lookup() {
        let (ledger, feed) = service();
        let err = ledger
            .withdraw(&OwnerId::from("user-1"), &CurrencyCode::new("ETH"), dec!(1))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::WalletNotFound { .. }));
        assert!(err.is_user_facing());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_withdrawal_leaves_an_empty_wallet() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");
        let eth = CurrencyCode::new("ETH");

        ledger.deposit(&owner, &eth, dec!(1.5)).await?;
        let receipt = ledger.withdraw(&owner, &eth, dec!(1.5)).await?;

        assert_eq!(receipt.balance, Decimal::ZERO);
        assert_eq!(receipt.transaction.kind, TransactionKind::Withdraw);
        let wallets = ledger.wallets(&owner).await?;
        assert_eq!(wallets.len(), 1);
        assert!(wallets[0].is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn history_pages_newest_first() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");
        let eth = CurrencyCode::new("ETH");

        ledger.deposit(&owner, &eth, dec!(1)).await?;
        ledger.deposit(&owner, &eth, dec!(2)).await?;
        ledger.withdraw(&owner, &eth, dec!(0.5)).await?;

        let all = ledger.history(&owner, 0, 0).await?;
        assert_eq!(all.total, 3);
        assert_eq!(all.transactions[0].kind, TransactionKind::Withdraw);

        let page = ledger.history(&owner, 1, 1).await?;
        assert_eq!(page.total, 3);
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].amount, dec!(2));
        Ok(())
    }

    #[tokio::test]
    async fn deposit_past_decimal_range_is_rejected() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");
        let idr = CurrencyCode::new("IDR");
        let half = Decimal::MAX / dec!(2) + Decimal::ONE;

        ledger.deposit(&owner, &idr, half).await?;
        let err = ledger.deposit(&owner, &idr, half).await.unwrap_err();

        assert!(matches!(err, LedgerError::AmountOutOfRange { ref currency } if currency == &idr));
        assert!(err.is_user_facing());
        assert_eq!(ledger.wallets(&owner).await?[0].balance, half);
        assert_eq!(ledger.history(&owner, 0, 0).await?.total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn amounts_below_balance_precision_are_rejected() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");
        let eth = CurrencyCode::new("ETH");
        let large = dec!(100000000000000000000);
        let dust = Decimal::new(1, 21);

        ledger.deposit(&owner, &eth, large).await?;
        assert!(matches!(
            ledger.deposit(&owner, &eth, dust).await,
            Err(LedgerError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            ledger.withdraw(&owner, &eth, dust).await,
            Err(LedgerError::AmountOutOfRange { .. })
        ));

        assert_eq!(ledger.wallets(&owner).await?[0].balance, large);
        assert_eq!(ledger.history(&owner, 0, 0).await?.total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn high_precision_amounts_that_fit_are_kept_exactly() -> Result<()> {
        let (ledger, _) = service();
        let owner = OwnerId::from("user-1");
        let eth = CurrencyCode::new("ETH");

        ledger.deposit(&owner, &eth, dec!(1.5)).await?;
        let receipt = ledger
            .deposit(&owner, &eth, dec!(0.000000000000000001))
            .await?;

        assert_eq!(receipt.balance, dec!(1.500000000000000001));
        Ok(())
    }
}
