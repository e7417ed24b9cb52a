use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CurrencyCode, Id, OwnerId};

/// One owner's holding of one currency. There is at most one wallet per
/// (owner, currency) pair and its balance never drops below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Id,
    pub owner: OwnerId,
    pub currency: CurrencyCode,
    /// Serialized as a string to avoid floating point precision issues.
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// An empty wallet, ready to be handed to `LedgerScope::create_wallet`.
    pub fn empty(id: Id, owner: OwnerId, currency: CurrencyCode, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            currency,
            balance: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_zero()
    }
}
