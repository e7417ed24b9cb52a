use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use super::{AssetValuation, PortfolioSnapshot};
use crate::error::LedgerError;
use crate::market_data::PriceResolver;
use crate::models::OwnerId;
use crate::storage::LedgerStore;

pub struct PortfolioService {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceResolver>,
}

impl PortfolioService {
    pub fn new(store: Arc<dyn LedgerStore>, prices: Arc<PriceResolver>) -> Self {
        Self { store, prices }
    }

    /// Value every wallet with a non-zero balance.
    ///
    /// Any price that cannot be resolved fails the whole request with
    /// [`LedgerError::PriceUnavailable`], and a value too large for `Decimal`
    /// fails it with [`LedgerError::ValuationOverflow`]. A partial valuation
    /// is never returned.
    pub async fn portfolio(&self, owner: &OwnerId) -> Result<PortfolioSnapshot, LedgerError> {
        let wallets = self
            .store
            .list_wallets(owner)
            .await
            .map_err(LedgerError::Storage)?;

        let mut assets = Vec::new();
        let mut total_value = Decimal::ZERO;
        for wallet in wallets.into_iter().filter(|w| !w.is_empty()) {
            let unit_price = self
                .prices
                .unit_price(&wallet.currency)
                .await
                .map_err(LedgerError::PriceUnavailable)?;
            let overflow = || LedgerError::ValuationOverflow {
                currency: wallet.currency.clone(),
            };
            let value = wallet.balance.checked_mul(unit_price).ok_or_else(overflow)?;
            total_value = total_value.checked_add(value).ok_or_else(overflow)?;
            assets.push(AssetValuation {
                currency: wallet.currency,
                balance: wallet.balance,
                unit_price,
                value,
            });
        }

        debug!(
            owner = %owner,
            assets = assets.len(),
            total = %total_value,
            "portfolio valued"
        );
        Ok(PortfolioSnapshot {
            reference_currency: self.prices.registry().reference().clone(),
            assets,
            total_value,
        })
    }
}
