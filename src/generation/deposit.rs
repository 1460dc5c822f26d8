//! Funding deposits, one per account

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::helpers::{calculate_optimal_concurrency, deposit_source_account, group_by_asset};
use super::{GenerationContext, GenerationPhase, Partition, PhaseProgress, ProgressCallback};
use crate::strategy::DepositStrategy;
use crate::types::{AccountWithAsset, Metadata, Transaction, TransactionRequest};

/// Smallest partition a deposit batch is built for
const MIN_PARTITION_SIZE: usize = 1;

/// Credits every account with a deposit debited from its asset's funding account
pub struct DepositGenerator {
    context: GenerationContext,
    strategy: Arc<dyn DepositStrategy>,
}

impl DepositGenerator {
    pub fn new(context: GenerationContext, strategy: Arc<dyn DepositStrategy>) -> Self {
        Self { context, strategy }
    }

    /// Deposit into every account, one batch per asset partition
    ///
    /// Accounts without a precomputed `deposit_amount` get one from the
    /// strategy; non-positive amounts are skipped.
    pub async fn generate(
        &self,
        organization_id: &str,
        ledger_id: &str,
        accounts: &[AccountWithAsset],
        progress: Option<ProgressCallback>,
    ) -> Vec<Transaction> {
        let partitions: Vec<(String, Vec<TransactionRequest>)> = group_by_asset(accounts)
            .into_iter()
            .filter(|(asset_code, members)| {
                let viable = members.len() >= MIN_PARTITION_SIZE;
                if !viable {
                    debug!(asset_code = %asset_code, "Skipping empty deposit partition");
                }
                viable
            })
            .map(|(asset_code, members)| {
                let requests = members
                    .iter()
                    .filter_map(|account| self.build_request(account))
                    .collect();
                (asset_code, requests)
            })
            .collect();

        let total: usize = partitions.iter().map(|(_, requests)| requests.len()).sum();
        let partition_count = partitions.len();
        let phase_progress = PhaseProgress::new(GenerationPhase::GenerateDeposits, total, progress);

        info!(
            partitions = partition_count,
            deposits = total,
            "Generating deposits"
        );

        let batches = partitions
            .into_iter()
            .filter(|(_, requests)| !requests.is_empty())
            .map(|(asset_code, requests)| {
                let phase_progress = &phase_progress;
                async move {
                    let partition = Partition {
                        organization_id,
                        ledger_id,
                        asset_code: &asset_code,
                        concurrency: calculate_optimal_concurrency(
                            requests.len(),
                            partition_count,
                            self.context.config.max_concurrency,
                        ),
                    };
                    self.context
                        .submit_partition(partition, requests, phase_progress)
                        .await
                }
            });

        join_all(batches).await.into_iter().flatten().collect()
    }

    fn build_request(&self, account: &AccountWithAsset) -> Option<TransactionRequest> {
        let amount = account
            .deposit_amount
            .unwrap_or_else(|| self.strategy.calculate_amount(account));

        if amount <= Decimal::ZERO {
            debug!(
                account_id = %account.account_id,
                amount = %amount,
                "Skipping non-positive deposit"
            );
            return None;
        }

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), "deposit".to_string());

        Some(TransactionRequest::transfer(
            format!("Deposit to {}", account.display_name()),
            deposit_source_account(&self.context.config.deposit_source, &account.asset_code),
            account.account_id.clone(),
            amount,
            self.context.config.scale,
            account.asset_code.clone(),
            metadata,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::Fixture;
    use crate::strategy::FixedDepositStrategy;
    use crate::types::{LedgerError, OperationType};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn generator(fixture: &Fixture) -> DepositGenerator {
        DepositGenerator::new(
            fixture.context(),
            Arc::new(FixedDepositStrategy::new(dec!(100))),
        )
    }

    #[tokio::test]
    async fn test_deposits_are_balanced_and_debit_the_external_account() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("c", "BRL")]);

        let transactions = generator(&fixture)
            .generate("org", "ledger", &fixture.resolved(), None)
            .await;

        assert_eq!(transactions.len(), 3);
        for transaction in &transactions {
            let debits: Decimal = transaction
                .operations
                .iter()
                .filter(|op| op.operation_type == OperationType::Debit)
                .map(|op| op.amount.value)
                .sum();
            let credits: Decimal = transaction
                .operations
                .iter()
                .filter(|op| op.operation_type == OperationType::Credit)
                .map(|op| op.amount.value)
                .sum();
            assert_eq!(debits, credits);
            assert!(transaction
                .operations
                .iter()
                .all(|op| op.amount.asset_code == transaction.asset_code));
            assert_eq!(
                transaction.source_account_id(),
                Some(format!("@external/{}", transaction.asset_code).as_str())
            );
            assert_eq!(transaction.metadata.get("type").map(String::as_str), Some("deposit"));
        }
        assert_eq!(fixture.counters.transactions_created(), 3);
        assert_eq!(fixture.store.transaction_ids("ledger").len(), 3);
    }

    #[tokio::test]
    async fn test_deposits_debit_the_configured_source() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("treasury-USD", "USD")]);
        let mut context = fixture.context();
        context.config = context.config.with_deposit_source("treasury-{asset}");
        let generator = DepositGenerator::new(context, Arc::new(FixedDepositStrategy::new(dec!(5))));
        let accounts = vec![
            AccountWithAsset::new("a", "USD"),
            AccountWithAsset::new("b", "USD"),
        ];

        let transactions = generator.generate("org", "ledger", &accounts, None).await;

        assert_eq!(transactions.len(), 2);
        assert!(transactions
            .iter()
            .all(|t| t.source_account_id() == Some("treasury-USD")));
        assert_eq!(fixture.counters.transaction_errors(), 0);
    }

    #[tokio::test]
    async fn test_precomputed_amounts_win_and_non_positive_are_skipped() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD")]);
        let accounts = vec![
            AccountWithAsset::new("a", "USD").with_deposit_amount(dec!(42.5)),
            AccountWithAsset::new("b", "USD").with_deposit_amount(dec!(0)),
        ];

        let transactions = generator(&fixture)
            .generate("org", "ledger", &accounts, None)
            .await;

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, dec!(42.50));
        assert_eq!(transactions[0].target_account_id(), Some("a"));
    }

    #[tokio::test]
    async fn test_identical_failures_count_as_one_error() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("c", "USD")]);
        fixture
            .ledger
            .fail_always(LedgerError::upstream(400, "ledger is read only"));

        let transactions = generator(&fixture)
            .generate("org", "ledger", &fixture.resolved(), None)
            .await;

        assert!(transactions.is_empty());
        assert_eq!(fixture.counters.transaction_errors(), 1);
        assert_eq!(fixture.counters.transactions_created(), 0);
    }

    #[tokio::test]
    async fn test_progress_reports_every_settled_deposit() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("c", "EUR")]);
        fixture
            .ledger
            .fail_transactions_to("c", LedgerError::upstream(422, "frozen"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |phase, completed, total| {
            sink.lock().unwrap().push((phase, completed, total));
        });

        generator(&fixture)
            .generate("org", "ledger", &fixture.resolved(), Some(callback))
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen
            .iter()
            .all(|(phase, _, total)| *phase == GenerationPhase::GenerateDeposits && *total == 3));
        assert_eq!(seen.iter().map(|(_, completed, _)| *completed).max(), Some(3));
    }
}
