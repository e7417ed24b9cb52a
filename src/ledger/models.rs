use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Transaction;

/// Outcome of a committed deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction: Transaction,
    /// Wallet balance right after the mutation.
    pub balance: Decimal,
}

/// One page of an owner's history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub transactions: Vec<Transaction>,
    /// Count across all pages.
    pub total: usize,
}
