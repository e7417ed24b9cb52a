use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::state::{LedgerState, SharedLedger};
use super::{LedgerScope, LedgerStore};
use crate::clock::{Clock, SystemClock};
use crate::models::{CurrencyCode, IdGenerator, OwnerId, Transaction, UuidIdGenerator, Wallet};

const LEDGER_FILE: &str = "ledger.json";

/// JSON file-based ledger store.
///
/// Directory structure:
/// ```text
/// data/
///   ledger.json
/// ```
///
/// The whole ledger is loaded on open and rewritten on every commit. Commits
/// replace the file atomically, so a crash mid-write leaves the last committed
/// state on disk. One process should own a data directory at a time.
/// Scopes are serialized store-wide; reads are served from the last commit
/// and do not wait for an open scope.
pub struct JsonFileLedgerStore {
    base_path: PathBuf,
    state: SharedLedger,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl JsonFileLedgerStore {
    pub async fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let file = base_path.join(LEDGER_FILE);

        let state = match tokio::fs::read_to_string(&file).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %file.display(), "no ledger file yet, starting empty");
                LedgerState::default()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", file.display()))
            }
        };

        Ok(Self {
            base_path,
            state: SharedLedger::new(state),
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.base_path.join(LEDGER_FILE)
    }
}

#[async_trait::async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>> {
        let scope = self
            .state
            .begin(self.ids.clone(), self.clock.clone(), Some(self.ledger_file()))
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
