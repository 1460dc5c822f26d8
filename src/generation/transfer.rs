//! Peer-to-peer transfers within asset partitions

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::helpers::{calculate_optimal_concurrency, group_by_asset};
use super::{GenerationContext, GenerationPhase, Partition, PhaseProgress, ProgressCallback};
use crate::strategy::TransferStrategy;
use crate::types::{AccountWithAsset, Metadata, Transaction, TransactionRequest};

/// Smallest partition a transfer batch is built for
const MIN_PARTITION_SIZE: usize = 2;

/// Moves funds between accounts that share an asset
pub struct TransferGenerator {
    context: GenerationContext,
    strategy: Arc<dyn TransferStrategy>,
}

impl TransferGenerator {
    pub fn new(context: GenerationContext, strategy: Arc<dyn TransferStrategy>) -> Self {
        Self { context, strategy }
    }

    /// Send `transfers_per_account` transfers from every account
    ///
    /// Partitions with a single account are skipped, as are transfers for
    /// which the strategy finds no target or a non-positive amount.
    pub async fn generate(
        &self,
        organization_id: &str,
        ledger_id: &str,
        accounts: &[AccountWithAsset],
        transfers_per_account: usize,
        progress: Option<ProgressCallback>,
    ) -> Vec<Transaction> {
        if transfers_per_account == 0 {
            return Vec::new();
        }

        let partitions: Vec<(String, Vec<TransactionRequest>)> = group_by_asset(accounts)
            .into_iter()
            .filter(|(asset_code, members)| {
                let viable = members.len() >= MIN_PARTITION_SIZE;
                if !viable {
                    debug!(
                        asset_code = %asset_code,
                        accounts = members.len(),
                        "Skipping transfer partition with too few accounts"
                    );
                }
                viable
            })
            .map(|(asset_code, members)| {
                let requests = self.build_requests(&members, transfers_per_account);
                (asset_code, requests)
            })
            .collect();

        let total: usize = partitions.iter().map(|(_, requests)| requests.len()).sum();
        let partition_count = partitions.len();
        let phase_progress =
            PhaseProgress::new(GenerationPhase::GenerateTransfers, total, progress);

        info!(
            partitions = partition_count,
            transfers = total,
            transfers_per_account,
            "Generating transfers"
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

    fn build_requests(
        &self,
        partition: &[AccountWithAsset],
        transfers_per_account: usize,
    ) -> Vec<TransactionRequest> {
        let mut requests = Vec::with_capacity(partition.len() * transfers_per_account);

        for iteration in 0..transfers_per_account {
            for source in partition {
                let Some(target) = self.strategy.select_target_account(source, partition) else {
                    debug!(account_id = %source.account_id, "No transfer target available");
                    continue;
                };

                let amount = self.strategy.calculate_amount(source, iteration);
                if amount <= Decimal::ZERO {
                    debug!(
                        account_id = %source.account_id,
                        amount = %amount,
                        "Skipping non-positive transfer"
                    );
                    continue;
                }

                let mut metadata = Metadata::new();
                metadata.insert("type".to_string(), "transfer".to_string());
                metadata.insert("iteration".to_string(), iteration.to_string());

                requests.push(TransactionRequest::transfer(
                    format!(
                        "Transfer from {} to {}",
                        source.display_name(),
                        target.display_name()
                    ),
                    source.account_id.clone(),
                    target.account_id.clone(),
                    amount,
                    self.context.config.scale,
                    source.asset_code.clone(),
                    metadata,
                ));
            }
        }

        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::Fixture;
    use crate::strategy::{RandomTransferStrategy, RoundRobinTransferStrategy};
    use crate::types::{LedgerError, OperationType};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_transfers_stay_within_asset_and_balance() {
        let fixture = Fixture::new(&[
            ("a", "USD"),
            ("b", "USD"),
            ("c", "USD"),
            ("x", "BRL"),
            ("y", "BRL"),
        ]);
        let generator =
            TransferGenerator::new(fixture.context(), Arc::new(RandomTransferStrategy::new(Some(5))));
        let accounts: Vec<AccountWithAsset> = fixture
            .resolved()
            .into_iter()
            .map(|account| account.with_deposit_amount(dec!(1000)))
            .collect();

        let transactions = generator.generate("org", "ledger", &accounts, 3, None).await;

        assert_eq!(transactions.len(), 15);
        for transaction in &transactions {
            let debit = transaction
                .operations
                .iter()
                .find(|op| op.operation_type == OperationType::Debit)
                .unwrap();
            let credit = transaction
                .operations
                .iter()
                .find(|op| op.operation_type == OperationType::Credit)
                .unwrap();
            assert_eq!(debit.amount.value, credit.amount.value);
            assert_ne!(debit.account_id, credit.account_id);

            let asset_of = |id: &str| {
                accounts
                    .iter()
                    .find(|account| account.account_id == id)
                    .map(|account| account.asset_code.clone())
            };
            assert_eq!(asset_of(&debit.account_id), Some(transaction.asset_code.clone()));
            assert_eq!(asset_of(&credit.account_id), Some(transaction.asset_code.clone()));
        }
    }

    #[tokio::test]
    async fn test_single_account_partitions_are_skipped() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("lonely", "JPY")]);
        let generator =
            TransferGenerator::new(fixture.context(), Arc::new(RoundRobinTransferStrategy::default()));

        let transactions = generator
            .generate("org", "ledger", &fixture.resolved(), 1, None)
            .await;

        assert_eq!(transactions.len(), 2);
        assert!(transactions.iter().all(|tx| tx.asset_code == "USD"));
        assert_eq!(fixture.ledger.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_transfers_per_account_submits_nothing() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD")]);
        let generator =
            TransferGenerator::new(fixture.context(), Arc::new(RoundRobinTransferStrategy::default()));

        let transactions = generator
            .generate("org", "ledger", &fixture.resolved(), 0, None)
            .await;

        assert!(transactions.is_empty());
        assert_eq!(fixture.ledger.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_partition_does_not_stop_others() {
        let fixture = Fixture::new(&[("a", "USD"), ("b", "USD"), ("x", "EUR"), ("y", "EUR")]);
        fixture
            .ledger
            .fail_transactions_to("a", LedgerError::upstream(409, "conflict"));
        fixture
            .ledger
            .fail_transactions_to("b", LedgerError::upstream(422, "limit"));
        let generator =
            TransferGenerator::new(fixture.context(), Arc::new(RoundRobinTransferStrategy::default()));

        let transactions = generator
            .generate("org", "ledger", &fixture.resolved(), 1, None)
            .await;

        assert_eq!(transactions.len(), 2);
        assert!(transactions.iter().all(|tx| tx.asset_code == "EUR"));
        assert_eq!(fixture.counters.transaction_errors(), 2);
        assert_eq!(fixture.counters.transactions_created(), 2);
    }
}
