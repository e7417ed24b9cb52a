//! Ledger state shared by the in-memory and JSON file stores, plus the staged
//! scope both hand out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::LedgerScope;
use crate::clock::Clock;
use crate::models::{
    CurrencyCode, Id, IdGenerator, NewTransaction, OwnerId, Transaction, Wallet,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    #[serde(default)]
    wallets: Vec<Wallet>,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

impl LedgerState {
    pub(crate) fn find_wallet(&self, owner: &OwnerId, currency: &CurrencyCode) -> Option<&Wallet> {
        self.wallets
            .iter()
            .find(|w| &w.owner == owner && &w.currency == currency)
    }

    fn insert_wallet(&mut self, wallet: Wallet) -> Result<()> {
        if self.find_wallet(&wallet.owner, &wallet.currency).is_some() {
            bail!(
                "Wallet for owner {} and currency {} already exists",
                wallet.owner,
                wallet.currency
            );
        }
        if self.wallets.iter().any(|w| w.id == wallet.id) {
            bail!("Wallet id {} already in use", wallet.id);
        }
        self.wallets.push(wallet);
        Ok(())
    }

    fn set_balance(
        &mut self,
        wallet_id: &Id,
        balance: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        if balance < Decimal::ZERO {
            bail!("Refusing to store negative balance {balance} for wallet {wallet_id}");
        }
        let wallet = self
            .wallets
            .iter_mut()
            .find(|w| &w.id == wallet_id)
            .with_context(|| format!("Wallet {wallet_id} not found"))?;
        wallet.balance = balance;
        wallet.updated_at = now;
        Ok(())
    }

    fn push_transaction(&mut self, tx: Transaction) -> Result<()> {
        if self.transactions.iter().any(|t| t.id == tx.id) {
            bail!("Transaction id {} already in use", tx.id);
        }
        self.transactions.push(tx);
        Ok(())
    }

    pub(crate) fn wallets_for(&self, owner: &OwnerId) -> Vec<Wallet> {
        self.wallets
            .iter()
            .filter(|w| &w.owner == owner)
            .cloned()
            .collect()
    }

    pub(crate) fn transactions_for(
        &self,
        owner: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Vec<Transaction> {
        // Appends are chronological, so reverse insertion order breaks
        // timestamp ties newest first.
        let mut owned: Vec<&Transaction> = self
            .transactions
            .iter()
            .rev()
            .filter(|t| &t.owner == owner)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = owned.into_iter().skip(offset);
        if limit == 0 {
            page.cloned().collect()
        } else {
            page.take(limit).cloned().collect()
        }
    }

    pub(crate) fn count_transactions(&self, owner: &OwnerId) -> usize {
        self.transactions.iter().filter(|t| &t.owner == owner).count()
    }
}

/// Committed ledger state plus the writer lock guarding it.
///
/// Writers are serialized store-wide, since every commit rewrites the whole
/// ledger. Readers take the last published snapshot and never wait on an open
/// scope or on a commit's disk write.
pub(crate) struct SharedLedger {
    writer: Arc<Mutex<()>>,
    committed: Arc<RwLock<Arc<LedgerState>>>,
}

impl SharedLedger {
    pub(crate) fn new(state: LedgerState) -> Self {
        Self {
            writer: Arc::new(Mutex::new(())),
            committed: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<LedgerState> {
        self.committed
            .read()
            .expect("ledger snapshot lock poisoned")
            .clone()
    }

    /// Waits for any open scope to finish, then stages on the latest commit.
    pub(crate) async fn begin(
        &self,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        persist_to: Option<PathBuf>,
    ) -> StagedScope {
        let writer = self.writer.clone().lock_owned().await;
        let staged = LedgerState::clone(&self.snapshot());
        StagedScope {
            _writer: writer,
            committed: self.committed.clone(),
            staged,
            ids,
            clock,
            persist_to,
        }
    }
}

/// Exclusive scope over a [`SharedLedger`].
///
/// Holds the writer lock for its whole lifetime and works on a private copy;
/// commit persists the copy (when the store is file-backed) and then
/// publishes it.
pub(crate) struct StagedScope {
    _writer: OwnedMutexGuard<()>,
    committed: Arc<RwLock<Arc<LedgerState>>>,
    staged: LedgerState,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    persist_to: Option<PathBuf>,
}

#[async_trait::async_trait]
impl LedgerScope for StagedScope {
    async fn find_wallet(
        &mut self,
        owner: &OwnerId,
        currency: &CurrencyCode,
    ) -> Result<Option<Wallet>> {
        Ok(self.staged.find_wallet(owner, currency).cloned())
    }

    async fn create_wallet(&mut self, owner: &OwnerId, currency: &CurrencyCode) -> Result<Wallet> {
        let wallet = Wallet::empty(
            self.ids.new_id(),
            owner.clone(),
            currency.clone(),
            self.clock.now(),
        );
        self.staged.insert_wallet(wallet.clone())?;
        Ok(wallet)
    }

    async fn set_balance(&mut self, wallet_id: &Id, balance: Decimal) -> Result<()> {
        let now = self.clock.now();
        self.staged.set_balance(wallet_id, balance, now)
    }

    async fn append_transaction(&mut self, tx: NewTransaction) -> Result<Transaction> {
        let ids = &self.ids;
        let tx = tx.into_transaction(|| ids.new_id(), self.clock.now());
        self.staged.push_transaction(tx.clone())?;
        Ok(tx)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let StagedScope {
            _writer,
            committed,
            staged,
            persist_to,
            ..
        } = *self;

        if let Some(path) = persist_to {
            write_atomically(&path, &staged).await?;
            debug!(path = %path.display(), "ledger state persisted");
        }
        *committed.write().expect("ledger snapshot lock poisoned") = Arc::new(staged);
        Ok(())
    }
}

/// Write to a sibling temp file, flush it to disk, then rename over the
/// target so readers only ever see a complete file. The temp file is removed
/// again if any step fails.
pub(crate) async fn write_atomically(path: &Path, state: &LedgerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create directory")?;
    }
    let content = serde_json::to_vec_pretty(state).context("Failed to serialize ledger")?;

    let tmp = path.with_extension("json.tmp");
    let result = replace_with(&tmp, path, &content).await;
    if result.is_err() {
        if let Err(err) = tokio::fs::remove_file(&tmp).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %err, "failed to remove temp ledger file");
            }
        }
    }
    result
}

async fn replace_with(tmp: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(content)
        .await
        .context("Failed to write ledger")?;
    file.sync_all().await.context("Failed to flush ledger")?;
    drop(file);

    tokio::fs::rename(tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))
}
