mod json_file;
mod memory;
mod state;

pub use json_file::JsonFileLedgerStore;
pub use memory::MemoryLedgerStore;

use anyhow::Result;
use rust_decimal::Decimal;

use crate::models::{CurrencyCode, Id, NewTransaction, OwnerId, Transaction, Wallet};

/// Durable storage for wallets and their transaction history.
///
/// Reads on the store itself only ever observe committed state. All writes go
/// through a [`LedgerScope`].
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an exclusive atomic scope. Only one scope is open at a time; a
    /// second caller waits until the first commits or is dropped.
    async fn begin(&self) -> Result<Box<dyn LedgerScope>>;

    async fn find_wallet(&self, owner: &OwnerId, currency: &CurrencyCode)
        -> Result<Option<Wallet>>;

    /// Wallets in creation order.
    async fn list_wallets(&self, owner: &OwnerId) -> Result<Vec<Wallet>>;

    /// Newest first. A `limit` of zero means no limit.
    async fn list_transactions(
        &self,
        owner: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    async fn count_transactions(&self, owner: &OwnerId) -> Result<usize>;
}

/// An all-or-nothing unit of writes.
///
/// Nothing written through a scope is visible until [`LedgerScope::commit`]
/// succeeds. Dropping a scope without committing discards every staged write.
#[async_trait::async_trait]
pub trait LedgerScope: Send {
    /// Sees this scope's own staged writes.
    async fn find_wallet(
        &mut self,
        owner: &OwnerId,
        currency: &CurrencyCode,
    ) -> Result<Option<Wallet>>;

    /// Creates an empty wallet with a fresh id. Fails if the owner already has
    /// a wallet for `currency`.
    async fn create_wallet(&mut self, owner: &OwnerId, currency: &CurrencyCode) -> Result<Wallet>;

    /// Unconditional overwrite. Callers compute `balance` from a value read
    /// in the same scope.
    async fn set_balance(&mut self, wallet_id: &Id, balance: Decimal) -> Result<()>;

    /// Assigns id and timestamp when absent.
    async fn append_transaction(&mut self, tx: NewTransaction) -> Result<Transaction>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
