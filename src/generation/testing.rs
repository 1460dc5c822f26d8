//! Shared fixture for generator tests

use std::sync::Arc;

use super::{GenerationContext, GenerationCounters, GeneratorConfig};
use crate::ledger::{InMemoryLedger, InMemoryStateStore, LedgerClient, TransactionIdSink};
use crate::types::{AccountWithAsset, LedgerAccount};

pub(crate) struct Fixture {
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryStateStore>,
    pub counters: Arc<GenerationCounters>,
    accounts: Vec<(String, String)>,
}

impl Fixture {
    /// Ledger with one registered account per `(id, asset)` pair
    pub fn new(accounts: &[(&str, &str)]) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        for (id, asset) in accounts {
            ledger.register_account(LedgerAccount {
                id: id.to_string(),
                alias: None,
                asset_code: asset.to_string(),
            });
        }

        Self {
            ledger,
            store: Arc::new(InMemoryStateStore::new()),
            counters: Arc::new(GenerationCounters::default()),
            accounts: accounts
                .iter()
                .map(|(id, asset)| (id.to_string(), asset.to_string()))
                .collect(),
        }
    }

    pub fn client(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    pub fn context(&self) -> GenerationContext {
        let id_sink: Arc<dyn TransactionIdSink> = self.store.clone();
        GenerationContext::new(
            self.client(),
            id_sink,
            self.counters.clone(),
            GeneratorConfig {
                retry_delay: std::time::Duration::from_millis(1),
                ..GeneratorConfig::default()
            },
        )
    }

    /// The registered accounts, already resolved
    pub fn resolved(&self) -> Vec<AccountWithAsset> {
        self.accounts
            .iter()
            .map(|(id, asset)| AccountWithAsset::new(id.clone(), asset.clone()))
            .collect()
    }
}
