use rust_decimal::Decimal;

use crate::models::CurrencyCode;

/// Failures resolving a unit price in the reference currency.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(CurrencyCode),

    #[error("price not found for currency {currency} (feed id {feed_id})")]
    MissingPrice {
        currency: CurrencyCode,
        feed_id: String,
    },

    #[error("price feed request failed: {0:#}")]
    Fetch(#[source] anyhow::Error),
}

/// Errors surfaced by ledger mutations and portfolio valuation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be greater than 0")]
    InvalidAmount,

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(CurrencyCode),

    #[error("wallet not found for currency {currency}")]
    WalletNotFound { currency: CurrencyCode },

    #[error("insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        currency: CurrencyCode,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{currency} balance cannot represent the result of this amount exactly")]
    AmountOutOfRange { currency: CurrencyCode },

    #[error("price unavailable: {0}")]
    PriceUnavailable(#[source] PriceError),

    #[error("portfolio value of {currency} holdings exceeds the representable range")]
    ValuationOverflow { currency: CurrencyCode },

    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl LedgerError {
    /// True for rejections caused by the request itself. These are never
    /// retried and leave no trace in storage.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount
                | LedgerError::UnsupportedCurrency(_)
                | LedgerError::WalletNotFound { .. }
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::AmountOutOfRange { .. }
        )
    }
}

impl From<PriceError> for LedgerError {
    fn from(err: PriceError) -> Self {
        match err {
            PriceError::UnsupportedCurrency(currency) => LedgerError::UnsupportedCurrency(currency),
            other => LedgerError::PriceUnavailable(other),
        }
    }
}
