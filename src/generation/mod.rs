//! Transaction generation
//!
//! Turns a list of resolved accounts into double-entry transactions submitted
//! to a ledger:
//!
//! - `deposit` - one funding deposit per account, from the asset's external account
//! - `transfer` - peer-to-peer transfers inside each asset partition
//! - `orchestrator` - the full run: validate, resolve, deposit, settle, transfer
//! - `helpers` - partitioning, concurrency budgeting and error dedup
//!
//! Generators never abort on failures. Item failures are counted once per
//! distinct message, batch-level failures are logged and counted, and the run
//! carries on with the next partition.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::ledger::{BatchObserver, LedgerClient, TransactionIdSink};
use crate::types::{BatchOptions, LedgerError, Metadata, Transaction, TransactionRequest};

pub mod deposit;
pub mod helpers;
pub mod orchestrator;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use deposit::DepositGenerator;
pub use helpers::{calculate_optimal_concurrency, extract_unique_error_messages, group_by_asset};
pub use orchestrator::{GenerationRequest, OrchestratorConfig, TransactionOrchestrator};
pub use transfer::TransferGenerator;

/// Default global budget of in-flight requests, shared by all partitions
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;
/// Default number of decimal places of generated amounts
pub const DEFAULT_SCALE: u32 = 2;
/// Largest scale accepted for generated amounts
pub const MAX_SCALE: u32 = 18;
/// Prefix of source accounts that live outside the ledger
pub const EXTERNAL_ACCOUNT_PREFIX: &str = "@external/";
/// Placeholder replaced by the asset code in a deposit source template
pub const ASSET_PLACEHOLDER: &str = "{asset}";
/// Deposits debit the asset's external account unless configured otherwise
pub const DEFAULT_DEPOSIT_SOURCE: &str = "@external/{asset}";

/// Phase of a generation run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationPhase {
    Validate,
    PrepareAccounts,
    GenerateDeposits,
    SettlementDelay,
    GenerateTransfers,
    Done,
}

impl fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationPhase::Validate => "validate",
            GenerationPhase::PrepareAccounts => "prepare_accounts",
            GenerationPhase::GenerateDeposits => "deposits",
            GenerationPhase::SettlementDelay => "settlement_delay",
            GenerationPhase::GenerateTransfers => "transfers",
            GenerationPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Progress callback `(phase, completed, total)`
pub type ProgressCallback = Arc<dyn Fn(GenerationPhase, usize, usize) + Send + Sync>;

/// Aggregate counters of a generation run
#[derive(Debug, Default)]
pub struct GenerationCounters {
    transactions_created: AtomicU64,
    transaction_errors: AtomicU64,
}

impl GenerationCounters {
    pub fn record_created(&self) {
        self.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.record_errors(1);
    }

    pub fn record_errors(&self, count: u64) {
        self.transaction_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn transactions_created(&self) -> u64 {
        self.transactions_created.load(Ordering::Relaxed)
    }

    pub fn transaction_errors(&self) -> u64 {
        self.transaction_errors.load(Ordering::Relaxed)
    }
}

/// Submission settings shared by the deposit and transfer generators
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Global budget of in-flight requests, split across asset partitions
    pub max_concurrency: usize,
    /// Retries per request for transient failures
    pub max_retries: u32,
    /// Base retry backoff
    pub retry_delay: Duration,
    /// Pause of a worker slot after each request
    pub delay_between_transactions: Duration,
    /// Decimal places of generated amounts
    pub scale: u32,
    /// Account id every deposit debits; `{asset}` expands to the asset code
    pub deposit_source: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            delay_between_transactions: Duration::ZERO,
            scale: DEFAULT_SCALE,
            deposit_source: DEFAULT_DEPOSIT_SOURCE.to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Create a config, replacing invalid values with defaults
    pub fn new(
        max_concurrency: usize,
        max_retries: u32,
        retry_delay: Duration,
        delay_between_transactions: Duration,
        scale: u32,
    ) -> Self {
        let default = Self::default();

        let max_concurrency = if max_concurrency == 0 {
            warn!(
                max_concurrency,
                default = default.max_concurrency,
                "Invalid max_concurrency, using default"
            );
            default.max_concurrency
        } else {
            max_concurrency
        };

        let scale = if scale > MAX_SCALE {
            warn!(scale, default = default.scale, "Invalid scale, using default");
            default.scale
        } else {
            scale
        };

        Self {
            max_concurrency,
            max_retries,
            retry_delay,
            delay_between_transactions,
            scale,
            deposit_source: default.deposit_source,
        }
    }

    /// Debit deposits from `template` instead of the external account
    ///
    /// A blank template keeps the current source.
    pub fn with_deposit_source(mut self, template: impl Into<String>) -> Self {
        let template: String = template.into();
        let template = template.trim();
        if template.is_empty() {
            warn!(
                default = %self.deposit_source,
                "Empty deposit source, keeping current"
            );
        } else {
            self.deposit_source = template.to_string();
        }
        self
    }
}

/// Collaborators a generator submits through
#[derive(Clone)]
pub struct GenerationContext {
    pub client: Arc<dyn LedgerClient>,
    pub id_sink: Arc<dyn TransactionIdSink>,
    pub counters: Arc<GenerationCounters>,
    pub config: GeneratorConfig,
}

impl GenerationContext {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        id_sink: Arc<dyn TransactionIdSink>,
        counters: Arc<GenerationCounters>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            client,
            id_sink,
            counters,
            config,
        }
    }

    fn batch_options(&self, concurrency: usize, phase: GenerationPhase) -> BatchOptions {
        let mut batch_metadata = Metadata::new();
        batch_metadata.insert("generated".to_string(), "true".to_string());
        batch_metadata.insert("phase".to_string(), phase.to_string());

        BatchOptions {
            concurrency,
            max_retries: self.config.max_retries,
            retry_delay: self.config.retry_delay,
            stop_on_error: false,
            delay_between_transactions: self.config.delay_between_transactions,
            batch_metadata,
        }
    }

    /// Submit one asset partition as a single batch
    ///
    /// Returns the transactions the ledger accepted, including those of a
    /// batch that failed as a whole but reported partial results.
    pub(crate) async fn submit_partition(
        &self,
        partition: Partition<'_>,
        requests: Vec<TransactionRequest>,
        progress: &PhaseProgress,
    ) -> Vec<Transaction> {
        let request_count = requests.len();
        let options = self.batch_options(partition.concurrency, progress.phase);
        let observer = PartitionObserver {
            context: self,
            ledger_id: partition.ledger_id,
            progress,
        };

        debug!(
            phase = %progress.phase,
            asset_code = partition.asset_code,
            requests = request_count,
            concurrency = partition.concurrency,
            "Submitting partition"
        );

        let outcome = self
            .client
            .create_transactions_batch(
                partition.organization_id,
                partition.ledger_id,
                requests,
                &options,
                &observer,
            )
            .await;

        let results = match outcome {
            Ok(result) => {
                info!(
                    phase = %progress.phase,
                    asset_code = partition.asset_code,
                    succeeded = result.success_count,
                    failed = result.failure_count,
                    "Partition settled"
                );
                result.results
            }
            Err(batch_error) => {
                error!(
                    phase = %progress.phase,
                    organization_id = partition.organization_id,
                    ledger_id = partition.ledger_id,
                    asset_code = partition.asset_code,
                    requests = request_count,
                    error = %batch_error,
                    "Batch submission failed"
                );
                self.counters.record_error();
                batch_error.results.unwrap_or_default()
            }
        };

        for message in helpers::record_unique_errors(&self.counters, &results) {
            warn!(
                phase = %progress.phase,
                asset_code = partition.asset_code,
                error = %message,
                "Transactions failed"
            );
        }

        results
            .into_iter()
            .filter_map(|result| result.transaction)
            .collect()
    }
}

/// Addressing and budget of one asset partition's batch
#[derive(Debug, Clone, Copy)]
pub(crate) struct Partition<'a> {
    pub organization_id: &'a str,
    pub ledger_id: &'a str,
    pub asset_code: &'a str,
    pub concurrency: usize,
}

/// Progress of one phase, shared by all of its partitions
pub(crate) struct PhaseProgress {
    phase: GenerationPhase,
    total: usize,
    completed: AtomicUsize,
    callback: Option<ProgressCallback>,
}

impl PhaseProgress {
    pub fn new(phase: GenerationPhase, total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            phase,
            total,
            completed: AtomicUsize::new(0),
            callback,
        }
    }

    fn advance(&self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = &self.callback {
            callback(self.phase, completed, self.total);
        }
    }
}

struct PartitionObserver<'a> {
    context: &'a GenerationContext,
    ledger_id: &'a str,
    progress: &'a PhaseProgress,
}

impl BatchObserver for PartitionObserver<'_> {
    fn on_transaction_success(
        &self,
        _request: &TransactionRequest,
        _index: usize,
        transaction: &Transaction,
    ) {
        self.context.counters.record_created();
        self.context
            .id_sink
            .record_transaction_id(self.ledger_id, &transaction.id);
        self.progress.advance();
    }

    fn on_transaction_error(&self, request: &TransactionRequest, index: usize, error: &LedgerError) {
        debug!(
            index,
            description = %request.description,
            error = %error,
            "Transaction failed"
        );
        self.progress.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryStateStore;
    use crate::types::{BatchError, BatchResult, ItemResult, LedgerAccount};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Ledger whose batch endpoint fails as a whole after settling some items
    struct PartialBatchLedger;

    fn deposit_request() -> TransactionRequest {
        TransactionRequest::transfer(
            "Deposit to a",
            "@external/USD",
            "a",
            dec!(10),
            2,
            "USD",
            Metadata::new(),
        )
    }

    #[async_trait]
    impl LedgerClient for PartialBatchLedger {
        async fn get_account(
            &self,
            _organization_id: &str,
            _ledger_id: &str,
            account_id: &str,
        ) -> Result<LedgerAccount, LedgerError> {
            Err(LedgerError::account_not_found(account_id))
        }

        async fn create_transaction(
            &self,
            _organization_id: &str,
            _ledger_id: &str,
            _request: &TransactionRequest,
        ) -> Result<Transaction, LedgerError> {
            Err(LedgerError::transport("not used"))
        }

        async fn create_transactions_batch(
            &self,
            _organization_id: &str,
            _ledger_id: &str,
            _requests: Vec<TransactionRequest>,
            _options: &BatchOptions,
            _observer: &dyn BatchObserver,
        ) -> Result<BatchResult, BatchError> {
            Err(BatchError::with_results(
                "connection dropped mid-batch",
                vec![
                    ItemResult::success(Transaction::from_request("tx-1", &deposit_request())),
                    ItemResult::failed("E1"),
                    ItemResult::failed("E1"),
                    ItemResult::failed("E2"),
                ],
            ))
        }
    }

    #[tokio::test]
    async fn test_failed_batch_counts_once_and_keeps_partial_results() {
        let counters = Arc::new(GenerationCounters::default());
        let context = GenerationContext::new(
            Arc::new(PartialBatchLedger),
            Arc::new(InMemoryStateStore::new()),
            counters.clone(),
            GeneratorConfig::default(),
        );
        let progress = PhaseProgress::new(GenerationPhase::GenerateDeposits, 4, None);
        let partition = Partition {
            organization_id: "org",
            ledger_id: "ledger",
            asset_code: "USD",
            concurrency: 2,
        };

        let transactions = context
            .submit_partition(partition, vec![deposit_request(); 4], &progress)
            .await;

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].id, "tx-1");
        // One for the batch, one per distinct item message
        assert_eq!(counters.transaction_errors(), 3);
    }

    #[test]
    fn test_generator_config_falls_back_on_invalid_values() {
        let config = GeneratorConfig::new(0, 1, Duration::from_millis(5), Duration::ZERO, 40);

        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.scale, DEFAULT_SCALE);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.deposit_source, DEFAULT_DEPOSIT_SOURCE);
    }

    #[test]
    fn test_counters() {
        let counters = GenerationCounters::default();
        counters.record_created();
        counters.record_created();
        counters.record_error();
        counters.record_errors(3);

        assert_eq!(counters.transactions_created(), 2);
        assert_eq!(counters.transaction_errors(), 4);
    }

    #[test]
    fn test_phase_progress_forwards_running_count() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |phase, completed, total| {
            sink.lock().unwrap().push((phase, completed, total));
        });

        let progress = PhaseProgress::new(GenerationPhase::GenerateDeposits, 2, Some(callback));
        progress.advance();
        progress.advance();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (GenerationPhase::GenerateDeposits, 1, 2),
                (GenerationPhase::GenerateDeposits, 2, 2),
            ]
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(GenerationPhase::GenerateTransfers.to_string(), "transfers");
        assert_eq!(GenerationPhase::Done.to_string(), "done");
    }
}
