//! Batch submission types
//!
//! A batch submission sends many [`TransactionRequest`](super::TransactionRequest)s
//! under bounded concurrency and returns one [`BatchResult`] whose per-item
//! results line up with the submitted requests.

use std::time::Duration;

use super::transaction::{Metadata, Transaction};

/// Configuration of one batch submission
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Maximum number of requests in flight
    pub concurrency: usize,

    /// Retries per request after the first attempt (retryable errors only)
    pub max_retries: u32,

    /// Base backoff between retries, doubled on every attempt
    pub retry_delay: Duration,

    /// Abort the remaining dispatch at the first failed request
    pub stop_on_error: bool,

    /// Pause a worker slot takes after each request, to respect rate limits
    pub delay_between_transactions: Duration,

    /// Metadata merged into every request of the batch (request keys win)
    pub batch_metadata: Metadata,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            stop_on_error: false,
            delay_between_transactions: Duration::ZERO,
            batch_metadata: Metadata::new(),
        }
    }
}

/// Outcome of a single batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Success,
    Failed,
}

/// Result of one request in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub status: ItemStatus,

    /// Created transaction, for successful items
    pub transaction: Option<Transaction>,

    /// Normalized error message, for failed items
    pub error: Option<String>,
}

impl ItemResult {
    pub fn success(transaction: Transaction) -> Self {
        ItemResult {
            status: ItemStatus::Success,
            transaction: Some(transaction),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ItemResult {
            status: ItemStatus::Failed,
            transaction: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Result of a whole batch submission
///
/// `results[i]` is the outcome of the i-th submitted request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<ItemResult>,
}

impl BatchResult {
    /// Build a result from per-item outcomes, deriving the counts
    pub fn from_results(results: Vec<ItemResult>) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        BatchResult {
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }

    /// Transactions created by the successful items, in submission order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.results.iter().filter_map(|r| r.transaction.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionRequest;
    use rust_decimal_macros::dec;

    fn transaction(id: &str) -> Transaction {
        let request = TransactionRequest::transfer(
            "t",
            "a",
            "b",
            dec!(1),
            2,
            "USD",
            Metadata::new(),
        );
        Transaction::from_request(id, &request)
    }

    #[test]
    fn test_from_results_counts_outcomes() {
        let result = BatchResult::from_results(vec![
            ItemResult::success(transaction("tx-1")),
            ItemResult::failed("E1"),
            ItemResult::success(transaction("tx-2")),
        ]);

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        let ids: Vec<&str> = result.transactions().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tx-1", "tx-2"]);
    }

    #[test]
    fn test_default_options_continue_on_error() {
        let options = BatchOptions::default();
        assert!(!options.stop_on_error);
        assert!(options.concurrency > 0);
    }
}
