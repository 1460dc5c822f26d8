//! Full generation runs
//!
//! A run walks its phases strictly in order:
//!
//! ```text
//! Validate -> PrepareAccounts -> GenerateDeposits -> SettlementDelay -> GenerateTransfers -> Done
//! ```
//!
//! Nothing in a run is fatal. Validation and lookup failures are logged,
//! counted and recovered from; the worst outcome is an empty or partial list
//! of transactions with an elevated error counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{
    DepositGenerator, GenerationContext, GenerationCounters, GenerationPhase, GeneratorConfig,
    ProgressCallback, TransferGenerator,
};
use crate::core::{WorkerPool, WorkerPoolOptions};
use crate::ledger::{AccountAssetStore, LedgerClient, TransactionIdSink};
use crate::strategy::{DepositStrategy, StrategyPair};
use crate::types::{
    AccountRef, AccountWithAsset, GenerationError, LedgerAccount, LedgerError, Metadata,
    Transaction, TransactionRequest,
};

/// Asset used when neither the ledger nor the store knows an account
pub const DEFAULT_ASSET_CODE: &str = "BRL";

/// Configuration of the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Wait between the deposit and transfer phases; zero skips it
    pub settlement_delay: Duration,
    /// Fallback asset code of accounts that cannot be resolved
    pub default_asset_code: String,
    /// Maximum concurrent account lookups
    pub lookup_concurrency: usize,
    /// Submission settings of both generators
    pub generator: GeneratorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settlement_delay: Duration::from_secs(2),
            default_asset_code: DEFAULT_ASSET_CODE.to_string(),
            lookup_concurrency: num_cpus::get(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a config, replacing invalid values with defaults
    pub fn new(
        settlement_delay: Duration,
        default_asset_code: impl Into<String>,
        lookup_concurrency: usize,
        generator: GeneratorConfig,
    ) -> Self {
        let default = Self::default();
        let default_asset_code = default_asset_code.into();

        let default_asset_code = if default_asset_code.trim().is_empty() {
            warn!(
                default = %default.default_asset_code,
                "Empty default asset code, using default"
            );
            default.default_asset_code
        } else {
            default_asset_code.trim().to_uppercase()
        };

        let lookup_concurrency = if lookup_concurrency == 0 {
            warn!(
                lookup_concurrency,
                default = default.lookup_concurrency,
                "Invalid lookup_concurrency, using default"
            );
            default.lookup_concurrency
        } else {
            lookup_concurrency
        };

        Self {
            settlement_delay,
            default_asset_code,
            lookup_concurrency,
            generator,
        }
    }
}

/// Input of one generation run
#[derive(Clone)]
pub struct GenerationRequest {
    pub organization_id: String,
    pub ledger_id: String,
    pub accounts: Vec<AccountRef>,
    /// Transactions per account, the deposit included
    pub transactions_per_account: usize,
    pub progress: Option<ProgressCallback>,
}

impl GenerationRequest {
    pub fn new(
        organization_id: impl Into<String>,
        ledger_id: impl Into<String>,
        accounts: Vec<AccountRef>,
        transactions_per_account: usize,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            ledger_id: ledger_id.into(),
            accounts,
            transactions_per_account,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, phase: GenerationPhase, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(phase, completed, total);
        }
    }
}

/// Sequences deposits and transfers for a set of accounts
pub struct TransactionOrchestrator {
    client: Arc<dyn LedgerClient>,
    asset_store: Arc<dyn AccountAssetStore>,
    id_sink: Arc<dyn TransactionIdSink>,
    counters: Arc<GenerationCounters>,
    deposit_strategy: Arc<dyn DepositStrategy>,
    deposits: DepositGenerator,
    transfers: TransferGenerator,
    config: OrchestratorConfig,
}

impl TransactionOrchestrator {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        asset_store: Arc<dyn AccountAssetStore>,
        id_sink: Arc<dyn TransactionIdSink>,
        strategies: StrategyPair,
        config: OrchestratorConfig,
    ) -> Self {
        let counters = Arc::new(GenerationCounters::default());
        let context = GenerationContext::new(
            client.clone(),
            id_sink.clone(),
            counters.clone(),
            config.generator.clone(),
        );

        Self {
            client,
            asset_store,
            id_sink,
            deposit_strategy: strategies.deposit.clone(),
            deposits: DepositGenerator::new(context.clone(), strategies.deposit),
            transfers: TransferGenerator::new(context, strategies.transfer),
            counters,
            config,
        }
    }

    pub fn counters(&self) -> &Arc<GenerationCounters> {
        &self.counters
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a complete generation
    ///
    /// Returns every transaction the ledger accepted, deposits first.
    pub async fn generate_transactions(&self, request: &GenerationRequest) -> Vec<Transaction> {
        let organization_id = request.organization_id.as_str();
        let ledger_id = request.ledger_id.as_str();

        request.report(GenerationPhase::Validate, 0, 1);
        if request.accounts.len() < 2 {
            let error = GenerationError::InsufficientAccounts {
                found: request.accounts.len(),
            };
            warn!(ledger_id, error = %error, "Skipping generation");
            self.counters.record_error();
            return Vec::new();
        }
        request.report(GenerationPhase::Validate, 1, 1);

        info!(
            organization_id,
            ledger_id,
            accounts = request.accounts.len(),
            transactions_per_account = request.transactions_per_account,
            "Starting generation"
        );

        let accounts = self
            .prepare_accounts(organization_id, ledger_id, &request.accounts, request.progress.as_ref())
            .await;

        let mut transactions = self
            .deposits
            .generate(organization_id, ledger_id, &accounts, request.progress.clone())
            .await;

        if !self.config.settlement_delay.is_zero() {
            request.report(GenerationPhase::SettlementDelay, 0, 1);
            debug!(
                delay_ms = self.config.settlement_delay.as_millis() as u64,
                "Waiting for deposits to settle"
            );
            sleep(self.config.settlement_delay).await;
            request.report(GenerationPhase::SettlementDelay, 1, 1);
        }

        let transfers_per_account = request.transactions_per_account.saturating_sub(1);
        if transfers_per_account == 0 {
            info!("No transfers requested, skipping transfer phase");
        } else {
            let transfers = self
                .transfers
                .generate(
                    organization_id,
                    ledger_id,
                    &accounts,
                    transfers_per_account,
                    request.progress.clone(),
                )
                .await;
            transactions.extend(transfers);
        }

        request.report(GenerationPhase::Done, transactions.len(), transactions.len());
        info!(
            ledger_id,
            transactions = transactions.len(),
            created = self.counters.transactions_created(),
            errors = self.counters.transaction_errors(),
            "Generation finished"
        );

        transactions
    }

    /// Resolve asset codes and deposit amounts of every account
    ///
    /// Lookup failures fall back to the asset store, then to the configured
    /// default asset. Resolved codes are written back to the store.
    pub async fn prepare_accounts(
        &self,
        organization_id: &str,
        ledger_id: &str,
        accounts: &[AccountRef],
        progress: Option<&ProgressCallback>,
    ) -> Vec<AccountWithAsset> {
        let pool = WorkerPool::new(WorkerPoolOptions {
            concurrency: self.config.lookup_concurrency,
            preserve_order: true,
            continue_on_error: true,
        });
        let total = accounts.len();
        let looked_up = AtomicUsize::new(0);
        let client = &self.client;
        let looked_up_ref = &looked_up;

        let lookups = pool
            .run(accounts.iter().collect(), move |account| async move {
                let result = client
                    .get_account(organization_id, ledger_id, &account.account_id)
                    .await;
                let completed = looked_up_ref.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = progress {
                    progress(GenerationPhase::PrepareAccounts, completed, total);
                }
                result
            })
            .await;

        // The pool continues on error, so it never aborts
        let lookups: Vec<Result<LedgerAccount, LedgerError>> = lookups.unwrap_or_else(|aborted| {
            let error = aborted.into_error();
            accounts.iter().map(|_| Err(error.clone())).collect()
        });

        accounts
            .iter()
            .zip(lookups)
            .map(|(account, lookup)| {
                let asset_code = self.resolve_asset_code(ledger_id, account, lookup);
                let mut resolved = AccountWithAsset::new(account.account_id.clone(), asset_code);
                resolved.account_alias = account.account_alias.clone();
                let deposit = self.deposit_strategy.calculate_amount(&resolved);
                resolved.with_deposit_amount(deposit)
            })
            .collect()
    }

    fn resolve_asset_code(
        &self,
        ledger_id: &str,
        account: &AccountRef,
        lookup: Result<LedgerAccount, LedgerError>,
    ) -> String {
        match lookup {
            Ok(found) => {
                self.asset_store
                    .set_asset_code(ledger_id, &account.account_id, &found.asset_code);
                found.asset_code
            }
            Err(lookup_error) => {
                let (asset_code, source) =
                    match self.asset_store.asset_code(ledger_id, &account.account_id) {
                        Some(known) => (known, "store"),
                        None => (self.config.default_asset_code.clone(), "default"),
                    };
                warn!(
                    account_id = %account.account_id,
                    error = %lookup_error,
                    asset_code = %asset_code,
                    source,
                    "Account lookup failed, using fallback asset"
                );
                asset_code
            }
        }
    }

    /// Create one transfer outside the batch machinery
    ///
    /// Returns `None` when the accounts use different assets or the ledger
    /// rejects the transaction; both are logged and counted as errors.
    pub async fn create_single_transaction(
        &self,
        organization_id: &str,
        ledger_id: &str,
        source: &AccountWithAsset,
        target: &AccountWithAsset,
        amount: Decimal,
    ) -> Option<Transaction> {
        if source.asset_code != target.asset_code {
            let error = GenerationError::asset_mismatch(
                &source.account_id,
                &source.asset_code,
                &target.account_id,
                &target.asset_code,
            );
            warn!(error = %error, "Refusing cross-asset transaction");
            self.counters.record_error();
            return None;
        }

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), "single".to_string());
        let request = TransactionRequest::transfer(
            format!(
                "Transfer from {} to {}",
                source.display_name(),
                target.display_name()
            ),
            source.account_id.clone(),
            target.account_id.clone(),
            amount,
            self.config.generator.scale,
            source.asset_code.clone(),
            metadata,
        );

        let outcome = match request.validate_balanced() {
            Ok(()) => {
                self.client
                    .create_transaction(organization_id, ledger_id, &request)
                    .await
            }
            Err(invalid) => Err(invalid),
        };

        match outcome {
            Ok(transaction) => {
                self.counters.record_created();
                self.id_sink.record_transaction_id(ledger_id, &transaction.id);
                Some(transaction)
            }
            Err(ledger_error) => {
                error!(
                    organization_id,
                    ledger_id,
                    source = %source.account_id,
                    target = %target.account_id,
                    error = %ledger_error,
                    "Single transaction failed"
                );
                self.counters.record_error();
                None
            }
        }
    }
}
