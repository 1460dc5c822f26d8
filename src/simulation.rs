//! Simulated generation runs
//!
//! Wires the engine to an [`InMemoryLedger`] behind a circuit breaker, the
//! way a deployment would wire it to a remote ledger client. The binary uses
//! this to exercise a full generation without network access.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

use crate::cli::CliArgs;
use crate::core::{CircuitBreaker, CircuitBreakerStats, ProgressReporter};
use crate::generation::helpers::deposit_source_account;
use crate::generation::{
    GenerationPhase, GenerationRequest, ProgressCallback, TransactionOrchestrator,
    EXTERNAL_ACCOUNT_PREFIX,
};
use crate::io::{read_accounts_csv, write_transactions_csv, AccountEntry};
use crate::ledger::{GuardedLedgerClient, InMemoryLedger, InMemoryStateStore, LedgerClient};
use crate::strategy::create_strategies;
use crate::types::{AccountRef, GenerationError, LedgerAccount, Transaction};

/// Name of the breaker guarding the simulated ledger
pub const BREAKER_NAME: &str = "ledger";

/// Result of one simulated run
#[derive(Debug)]
pub struct SimulationOutcome {
    pub transactions: Vec<Transaction>,
    pub transactions_created: u64,
    pub transaction_errors: u64,
    pub recorded_ids: usize,
    pub breaker: CircuitBreakerStats,
}

/// Accounts of a run, from the CSV list or synthesized
pub fn load_accounts(args: &CliArgs) -> Result<Vec<AccountEntry>, GenerationError> {
    if let Some(path) = &args.accounts_file {
        return read_accounts_csv(path);
    }

    let assets: Vec<String> = args
        .assets
        .iter()
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect();

    Ok((0..args.account_count)
        .map(|i| AccountEntry {
            account: AccountRef::with_alias(format!("acc-{:04}", i + 1), format!("account-{}", i + 1)),
            asset_code: (!assets.is_empty()).then(|| assets[i % assets.len()].clone()),
        })
        .collect())
}

/// Ledger pre-loaded with `entries`
///
/// Accounts without a declared asset are registered under `default_asset`.
/// A deposit source inside the ledger is registered once per asset.
pub fn build_ledger(args: &CliArgs, entries: &[AccountEntry], default_asset: &str) -> InMemoryLedger {
    let mut ledger = InMemoryLedger::new().with_latency(Duration::from_millis(args.latency_ms));
    if args.failure_rate > 0.0 {
        ledger = ledger.with_failure_rate(args.failure_rate, args.seed);
    }

    let mut assets = BTreeSet::new();
    for entry in entries {
        let asset_code = entry
            .asset_code
            .clone()
            .unwrap_or_else(|| default_asset.to_string());
        ledger.register_account(LedgerAccount {
            id: entry.account.account_id.clone(),
            alias: entry.account.account_alias.clone(),
            asset_code: asset_code.clone(),
        });
        assets.insert(asset_code);
    }

    let template = args.to_generator_config().deposit_source;
    for asset_code in assets {
        let source = deposit_source_account(&template, &asset_code);
        if !source.starts_with(EXTERNAL_ACCOUNT_PREFIX) {
            ledger.register_account(LedgerAccount {
                id: source,
                alias: None,
                asset_code,
            });
        }
    }
    ledger
}

/// Run a generation against `ledger`
pub async fn simulate(
    args: &CliArgs,
    entries: &[AccountEntry],
    ledger: Arc<InMemoryLedger>,
) -> SimulationOutcome {
    let breaker = Arc::new(CircuitBreaker::new(BREAKER_NAME, args.to_breaker_config()));
    let client: Arc<dyn LedgerClient> =
        Arc::new(GuardedLedgerClient::new(ledger, Arc::clone(&breaker)));
    let store = Arc::new(InMemoryStateStore::new());

    let orchestrator = TransactionOrchestrator::new(
        client,
        store.clone(),
        store.clone(),
        create_strategies(args.strategy, args.seed),
        args.to_orchestrator_config(),
    );

    let expected = entries.len() * args.transactions_per_account;
    let reporter = Arc::new(ProgressReporter::new(
        "generation",
        expected,
        args.to_progress_options(),
    ));

    let request = GenerationRequest::new(
        args.organization_id.clone(),
        args.ledger_id.clone(),
        entries.iter().map(|entry| entry.account.clone()).collect(),
        args.transactions_per_account,
    )
    .with_progress(progress_callback(Arc::clone(&reporter)));

    reporter.start();
    let transactions = orchestrator.generate_transactions(&request).await;

    // Units never submitted (skipped partitions, missing targets) still count
    for _ in reporter.metrics().processed_items()..expected {
        reporter.report_item_skipped();
    }
    reporter.stop();

    let counters = orchestrator.counters();
    SimulationOutcome {
        transactions,
        transactions_created: counters.transactions_created(),
        transaction_errors: counters.transaction_errors(),
        recorded_ids: store.transaction_ids(&args.ledger_id).len(),
        breaker: breaker.stats(),
    }
}

/// Feed settled deposits and transfers into `reporter`, logging phase changes
fn progress_callback(reporter: Arc<ProgressReporter>) -> ProgressCallback {
    let current = Mutex::new(None);
    Arc::new(move |phase: GenerationPhase, _completed: usize, total: usize| {
        {
            let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != Some(phase) {
                *current = Some(phase);
                info!(phase = %phase, total, "Entering phase");
            }
        }

        if matches!(
            phase,
            GenerationPhase::GenerateDeposits | GenerationPhase::GenerateTransfers
        ) {
            reporter.report_item_completed(None);
        }
    })
}

/// Load accounts, run a simulated generation and write the transactions as CSV
pub fn run_simulation(
    args: &CliArgs,
    output: &mut dyn Write,
) -> Result<SimulationOutcome, GenerationError> {
    let entries = load_accounts(args)?;
    let default_asset = args.to_orchestrator_config().default_asset_code;
    let ledger = Arc::new(build_ledger(args, &entries, &default_asset));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .map_err(|e| GenerationError::Io {
            message: format!("Failed to create tokio runtime: {}", e),
        })?;

    let outcome = runtime.block_on(simulate(args, &entries, ledger));

    write_transactions_csv(&outcome.transactions, output)?;

    info!(
        transactions = outcome.transactions.len(),
        created = outcome.transactions_created,
        errors = outcome.transaction_errors,
        breaker_state = %outcome.breaker.state,
        "Simulation finished"
    );

    Ok(outcome)
}
