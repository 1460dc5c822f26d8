//! Partitioning, concurrency budgeting and error dedup shared by the generators

use std::collections::{BTreeMap, BTreeSet};

use super::{GenerationCounters, ASSET_PLACEHOLDER};
use crate::types::{AccountWithAsset, ItemResult, ItemStatus};

/// Hard per-partition cap on in-flight requests
pub const MAX_PARTITION_CONCURRENCY: usize = 10;
/// Floor of a partition's share of the global budget
pub const MIN_PARTITION_CONCURRENCY: usize = 2;

/// Message recorded for a failed item that carries no error text
const UNKNOWN_ERROR: &str = "unknown error";

/// Group accounts by asset code
///
/// The map is ordered by asset code, so partitions are always processed in
/// the same order. Accounts keep their input order within a partition.
pub fn group_by_asset(accounts: &[AccountWithAsset]) -> BTreeMap<String, Vec<AccountWithAsset>> {
    let mut partitions: BTreeMap<String, Vec<AccountWithAsset>> = BTreeMap::new();
    for account in accounts {
        partitions
            .entry(account.asset_code.clone())
            .or_default()
            .push(account.clone());
    }
    partitions
}

/// Concurrency of one partition's batch
///
/// The global `max_concurrency` budget is split evenly across
/// `partition_count` partitions, floored at 2, then capped at 10 and at the
/// number of items in the partition.
pub fn calculate_optimal_concurrency(
    item_count: usize,
    partition_count: usize,
    max_concurrency: usize,
) -> usize {
    let share = (max_concurrency / partition_count.max(1)).max(MIN_PARTITION_CONCURRENCY);
    share.min(MAX_PARTITION_CONCURRENCY).min(item_count).max(1)
}

/// Distinct error messages among the failed results
pub fn extract_unique_error_messages(results: &[ItemResult]) -> BTreeSet<String> {
    results
        .iter()
        .filter(|result| result.status == ItemStatus::Failed)
        .map(|result| result.error.as_deref().unwrap_or(UNKNOWN_ERROR).to_string())
        .collect()
}

/// Increment the error counter once per distinct message
///
/// Returns the distinct messages so the caller can log them.
pub fn record_unique_errors(
    counters: &GenerationCounters,
    results: &[ItemResult],
) -> BTreeSet<String> {
    let unique = extract_unique_error_messages(results);
    counters.record_errors(unique.len() as u64);
    unique
}

/// Funding account of an asset, the debit side of every deposit
///
/// `template` names a single account when it has no `{asset}` placeholder.
pub fn deposit_source_account(template: &str, asset_code: &str) -> String {
    template.replace(ASSET_PLACEHOLDER, asset_code)
}
