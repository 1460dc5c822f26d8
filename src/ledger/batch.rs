//! Bounded, retrying batch submission
//!
//! [`submit_batch`] is the default batch implementation of every
//! [`LedgerClient`]. It runs `create_transaction` for each request through a
//! [`WorkerPool`], retries transient failures with exponential backoff,
//! paces each worker slot by `delay_between_transactions`, and reports every
//! settled item to a [`BatchObserver`].
//!
//! Requests that break the double-entry invariant are rejected locally and
//! never reach the ledger.

use tokio::time::sleep;
use tracing::debug;

use super::{BatchObserver, LedgerClient};
use crate::core::{WorkerPool, WorkerPoolError, WorkerPoolOptions};
use crate::types::{
    error_message, BatchError, BatchOptions, BatchResult, ItemResult, LedgerError, Transaction,
    TransactionRequest,
};

/// Submit `requests` through `client` under the given options
///
/// # Returns
///
/// * `Ok(BatchResult)` - one result per request, in request order
/// * `Err(BatchError)` - only when `stop_on_error` is set and an item failed;
///   the error carries the results of the items that settled before the abort
pub async fn submit_batch<C>(
    client: &C,
    organization_id: &str,
    ledger_id: &str,
    requests: Vec<TransactionRequest>,
    options: &BatchOptions,
    observer: &dyn BatchObserver,
) -> Result<BatchResult, BatchError>
where
    C: LedgerClient + ?Sized,
{
    let requests: Vec<TransactionRequest> = requests
        .into_iter()
        .map(|mut request| {
            for (key, value) in &options.batch_metadata {
                request
                    .metadata
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            request
        })
        .collect();

    let pool = WorkerPool::new(WorkerPoolOptions {
        concurrency: options.concurrency,
        preserve_order: true,
        continue_on_error: !options.stop_on_error,
    });

    let delay = options.delay_between_transactions;
    let outcome = pool
        .run(
            requests.iter().enumerate().collect(),
            move |(index, request)| async move {
                let result =
                    submit_with_retry(client, organization_id, ledger_id, request, options).await;

                match &result {
                    Ok(transaction) => observer.on_transaction_success(request, index, transaction),
                    Err(error) => observer.on_transaction_error(request, index, error),
                }

                if !delay.is_zero() {
                    sleep(delay).await;
                }

                result
            },
        )
        .await;

    match outcome {
        Ok(results) => Ok(BatchResult::from_results(
            results.into_iter().map(into_item_result).collect(),
        )),
        Err(WorkerPoolError::Aborted {
            index,
            error,
            completed,
        }) => {
            let mut partial: Vec<(usize, ItemResult)> = completed
                .into_iter()
                .map(|(i, transaction)| (i, ItemResult::success(transaction)))
                .collect();
            partial.push((index, ItemResult::failed(error_message(&error))));
            partial.sort_by_key(|(i, _)| *i);

            Err(BatchError::with_results(
                format!("stopped at request {} of {}: {}", index, requests.len(), error),
                partial.into_iter().map(|(_, result)| result).collect(),
            ))
        }
    }
}

fn into_item_result(result: Result<Transaction, LedgerError>) -> ItemResult {
    match result {
        Ok(transaction) => ItemResult::success(transaction),
        Err(error) => ItemResult::failed(error_message(&error)),
    }
}

/// Create one transaction, retrying transient failures
///
/// Backoff before retry `n` (0-based) is `retry_delay * 2^n`.
async fn submit_with_retry<C>(
    client: &C,
    organization_id: &str,
    ledger_id: &str,
    request: &TransactionRequest,
    options: &BatchOptions,
) -> Result<Transaction, LedgerError>
where
    C: LedgerClient + ?Sized,
{
    request.validate_balanced()?;

    let mut attempt: u32 = 0;
    loop {
        match client
            .create_transaction(organization_id, ledger_id, request)
            .await
        {
            Ok(transaction) => return Ok(transaction),
            Err(error) if error.is_retryable() && attempt < options.max_retries => {
                let backoff = options
                    .retry_delay
                    .saturating_mul(2u32.saturating_pow(attempt));
                debug!(
                    attempt = attempt + 1,
                    max_retries = options.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Retrying transaction"
                );
                attempt += 1;
                sleep(backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}
