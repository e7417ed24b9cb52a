use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::CurrencyCode;

/// Valuation of an owner's non-empty wallets. Derived on every request and
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub reference_currency: CurrencyCode,
    pub assets: Vec<AssetValuation>,
    /// Sum of every asset's `value`.
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetValuation {
    pub currency: CurrencyCode,
    pub balance: Decimal,
    /// Price of one unit in the reference currency.
    pub unit_price: Decimal,
    /// `balance * unit_price`.
    pub value: Decimal,
}
