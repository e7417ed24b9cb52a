//! In-memory ledger store for tests and embedding.

use std::sync::Arc;

use anyhow::Result;

use super::state::{LedgerState, SharedLedger};
use super::{LedgerScope, LedgerStore};
use crate::clock::{Clock, SystemClock};
use crate::models::{CurrencyCode, IdGenerator, OwnerId, Transaction, UuidIdGenerator, Wallet};

pub struct MemoryLedgerStore {
    state: SharedLedger,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: SharedLedger::new(LedgerState::default()),
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>> {
        let scope = self
            .state
            .begin(self.ids.clone(), self.clock.clone(), None)
            .await;
        Ok(Box::new(scope))
    }

    async fn find_wallet(
        &self,
        owner: &OwnerId,
        currency: &CurrencyCode,
    ) -> Result<Option<Wallet>> {
        Ok(self.state.snapshot().find_wallet(owner, currency).cloned())
    }

    async fn list_wallets(&self, owner: &OwnerId) -> Result<Vec<Wallet>> {
        Ok(self.state.snapshot().wallets_for(owner))
    }

    async fn list_transactions(
        &self,
        owner: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        Ok(self.state.snapshot().transactions_for(owner, limit, offset))
    }

    async fn count_transactions(&self, owner: &OwnerId) -> Result<usize> {
        Ok(self.state.snapshot().count_transactions(owner))
    }
}
