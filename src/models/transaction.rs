use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CurrencyCode, Id, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        })
    }
}

/// Whether `price_at` is a live quote or the zero placeholder recorded when
/// the price feed could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Resolved,
    Unavailable,
}

/// A transaction as handed to the store. Id and timestamp are assigned by the
/// store when absent.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Option<Id>,
    pub owner: OwnerId,
    pub kind: TransactionKind,
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub price_at: Decimal,
    pub price_status: PriceStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewTransaction {
    pub fn new(
        owner: OwnerId,
        kind: TransactionKind,
        currency: CurrencyCode,
        amount: Decimal,
        price_at: Option<Decimal>,
    ) -> Self {
        let (price_at, price_status) = match price_at {
            Some(price) => (price, PriceStatus::Resolved),
            None => (Decimal::ZERO, PriceStatus::Unavailable),
        };
        Self {
            id: None,
            owner,
            kind,
            currency,
            amount,
            price_at,
            price_status,
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Fill in whatever the caller left out.
    pub fn into_transaction(self, id: impl FnOnce() -> Id, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: self.id.unwrap_or_else(id),
            owner: self.owner,
            kind: self.kind,
            currency: self.currency,
            amount: self.amount,
            price_at: self.price_at,
            price_status: self.price_status,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

/// An immutable ledger entry. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    pub owner: OwnerId,
    pub kind: TransactionKind,
    pub currency: CurrencyCode,
    pub amount: Decimal,
    /// Unit price in the reference currency at the time of the mutation.
    pub price_at: Decimal,
    pub price_status: PriceStatus,
    pub created_at: DateTime<Utc>,
}
