//! In-memory ledger and state store
//!
//! # Design
//!
//! `InMemoryLedger` is a `LedgerClient` backed by `DashMap`s. It keeps an
//! account registry, assigns sequential transaction ids, records every
//! request it accepted, and can inject failures and latency. The CLI's
//! simulation mode, the benchmarks and the tests all drive the engine against
//! it.
//!
//! `InMemoryStateStore` implements [`AccountAssetStore`] and
//! [`TransactionIdSink`]. Callbacks from concurrently settling batch items
//! write into it, so every operation is a single `DashMap` entry update.
//!
//! # Thread Safety
//!
//! Both types are `Send + Sync` and meant to be shared behind an `Arc`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{AccountAssetStore, LedgerClient, TransactionIdSink};
use crate::generation::EXTERNAL_ACCOUNT_PREFIX;
use crate::types::{LedgerAccount, LedgerError, Transaction, TransactionRequest};

#[derive(Debug)]
struct InjectedFailure {
    /// `None` fails every call until cleared
    remaining: Option<usize>,
    error: LedgerError,
}

#[derive(Debug)]
struct RandomFailures {
    rate: f64,
    rng: StdRng,
}

/// In-memory `LedgerClient`
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: DashMap<String, LedgerAccount>,
    transactions: DashMap<String, Transaction>,
    accepted: Mutex<Vec<TransactionRequest>>,
    next_id: AtomicU64,
    latency: Duration,
    injected: Mutex<Option<InjectedFailure>>,
    random_failures: Mutex<Option<RandomFailures>>,
    failing_lookups: DashSet<String>,
    failing_targets: DashMap<String, LedgerError>,
    create_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            transactions: DashMap::new(),
            accepted: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            latency: Duration::ZERO,
            injected: Mutex::new(None),
            random_failures: Mutex::new(None),
            failing_lookups: DashSet::new(),
            failing_targets: DashMap::new(),
            create_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail a `rate` fraction of transaction calls with a transient 503
    pub fn with_failure_rate(self, rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        *lock(&self.random_failures) = Some(RandomFailures {
            rate: rate.clamp(0.0, 1.0),
            rng,
        });
        self
    }

    pub fn register_account(&self, account: LedgerAccount) {
        self.accounts.insert(account.id.clone(), account);
    }

    /// Fail the next `count` transaction calls with `error`
    pub fn fail_next(&self, count: usize, error: LedgerError) {
        *lock(&self.injected) = (count > 0).then_some(InjectedFailure {
            remaining: Some(count),
            error,
        });
    }

    /// Fail every transaction call with `error` until [`recover`](Self::recover)
    pub fn fail_always(&self, error: LedgerError) {
        *lock(&self.injected) = Some(InjectedFailure {
            remaining: None,
            error,
        });
    }

    /// Clear injected transaction failures
    pub fn recover(&self) {
        *lock(&self.injected) = None;
    }

    /// Fail lookups of `account_id` with a transport error
    pub fn fail_lookup(&self, account_id: impl Into<String>) {
        self.failing_lookups.insert(account_id.into());
    }

    /// Fail transactions crediting `account_id` with `error`
    pub fn fail_transactions_to(&self, account_id: impl Into<String>, error: LedgerError) {
        self.failing_targets.insert(account_id.into(), error);
    }

    /// Requests accepted so far, in acceptance order
    pub fn accepted_requests(&self) -> Vec<TransactionRequest> {
        lock(&self.accepted).clone()
    }

    pub fn transaction(&self, id: &str) -> Option<Transaction> {
        self.transactions.get(id).map(|entry| entry.value().clone())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Number of `create_transaction` calls that reached the ledger
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_account` calls that reached the ledger
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    fn injected_failure(&self) -> Option<LedgerError> {
        let mut injected = lock(&self.injected);
        let failure = injected.as_mut()?;
        let error = failure.error.clone();
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                *injected = None;
            }
        }
        Some(error)
    }

    fn random_failure(&self) -> Option<LedgerError> {
        let mut random = lock(&self.random_failures);
        let random = random.as_mut()?;
        let roll: f64 = random.rng.gen();
        (roll < random.rate).then(|| LedgerError::upstream(503, "service unavailable"))
    }

    /// Check every non-external leg against the account registry
    fn check_accounts(&self, request: &TransactionRequest) -> Result<(), LedgerError> {
        for operation in &request.operations {
            if operation.account_id.starts_with(EXTERNAL_ACCOUNT_PREFIX) {
                continue;
            }
            let account = self
                .accounts
                .get(&operation.account_id)
                .ok_or_else(|| LedgerError::account_not_found(&operation.account_id))?;
            if account.asset_code != operation.amount.asset_code {
                return Err(LedgerError::invalid_request(format!(
                    "account {} holds {} but operation uses {}",
                    operation.account_id, account.asset_code, operation.amount.asset_code
                )));
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_account(
        &self,
        _organization_id: &str,
        _ledger_id: &str,
        account_id: &str,
    ) -> Result<LedgerAccount, LedgerError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing_lookups.contains(account_id) {
            return Err(LedgerError::transport(format!(
                "lookup of {account_id} failed"
            )));
        }

        self.accounts
            .get(account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    async fn create_transaction(
        &self,
        _organization_id: &str,
        _ledger_id: &str,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.injected_failure().or_else(|| self.random_failure()) {
            return Err(error);
        }

        if let Some(target) = request.target_account_id() {
            if let Some(error) = self.failing_targets.get(target) {
                return Err(error.value().clone());
            }
        }

        request.validate_balanced()?;
        self.check_accounts(request)?;

        let id = format!("tx-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let transaction = Transaction::from_request(&id, request);
        self.transactions.insert(id, transaction.clone());
        lock(&self.accepted).push(request.clone());

        Ok(transaction)
    }
}

/// In-memory state store for asset codes and created transaction ids
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    asset_codes: DashMap<(String, String), String>,
    transaction_ids: DashMap<String, Vec<String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids recorded for `ledger_id`, in recording order
    pub fn transaction_ids(&self, ledger_id: &str) -> Vec<String> {
        self.transaction_ids
            .get(ledger_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }
}

impl AccountAssetStore for InMemoryStateStore {
    fn asset_code(&self, ledger_id: &str, account_id: &str) -> Option<String> {
        self.asset_codes
            .get(&(ledger_id.to_string(), account_id.to_string()))
            .map(|code| code.value().clone())
    }

    fn set_asset_code(&self, ledger_id: &str, account_id: &str, asset_code: &str) {
        self.asset_codes.insert(
            (ledger_id.to_string(), account_id.to_string()),
            asset_code.to_string(),
        );
    }
}

impl TransactionIdSink for InMemoryStateStore {
    fn record_transaction_id(&self, ledger_id: &str, transaction_id: &str) {
        self.transaction_ids
            .entry(ledger_id.to_string())
            .or_default()
            .push(transaction_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use rust_decimal_macros::dec;

    fn account(id: &str, asset: &str) -> LedgerAccount {
        LedgerAccount {
            id: id.to_string(),
            alias: None,
            asset_code: asset.to_string(),
        }
    }

    fn deposit(target: &str, asset: &str) -> TransactionRequest {
        TransactionRequest::transfer(
            "deposit",
            format!("{EXTERNAL_ACCOUNT_PREFIX}{asset}"),
            target,
            dec!(100),
            2,
            asset,
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn test_creates_transactions_with_sequential_ids() {
        let ledger = InMemoryLedger::new();
        ledger.register_account(account("a", "USD"));

        let first = ledger.create_transaction("o", "l", &deposit("a", "USD")).await.unwrap();
        let second = ledger.create_transaction("o", "l", &deposit("a", "USD")).await.unwrap();

        assert_eq!(first.id, "tx-000001");
        assert_eq!(second.id, "tx-000002");
        assert_eq!(ledger.accepted_requests().len(), 2);
        assert_eq!(ledger.transaction("tx-000001"), Some(first));
    }

    #[tokio::test]
    async fn test_rejects_unknown_accounts_and_asset_mismatch() {
        let ledger = InMemoryLedger::new();
        ledger.register_account(account("a", "USD"));

        let error = ledger.create_transaction("o", "l", &deposit("missing", "USD")).await.unwrap_err();
        assert_eq!(error, LedgerError::account_not_found("missing"));

        let error = ledger.create_transaction("o", "l", &deposit("a", "EUR")).await.unwrap_err();
        assert!(matches!(error, LedgerError::InvalidRequest { .. }));
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_next_recovers_by_itself() {
        let ledger = InMemoryLedger::new();
        ledger.register_account(account("a", "USD"));
        ledger.fail_next(1, LedgerError::transport("reset"));

        assert!(ledger.create_transaction("o", "l", &deposit("a", "USD")).await.is_err());
        assert!(ledger.create_transaction("o", "l", &deposit("a", "USD")).await.is_ok());
        assert_eq!(ledger.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_always_until_recover() {
        let ledger = InMemoryLedger::new();
        ledger.register_account(account("a", "USD"));
        ledger.fail_always(LedgerError::upstream(503, "down"));

        for _ in 0..3 {
            assert!(ledger.create_transaction("o", "l", &deposit("a", "USD")).await.is_err());
        }
        ledger.recover();
        assert!(ledger.create_transaction("o", "l", &deposit("a", "USD")).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_failure_rate_fails_everything() {
        let ledger = InMemoryLedger::new().with_failure_rate(1.0, Some(7));
        ledger.register_account(account("a", "USD"));

        let error = ledger.create_transaction("o", "l", &deposit("a", "USD")).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let ledger = InMemoryLedger::new();
        ledger.register_account(account("a", "USD"));
        ledger.fail_lookup("a");

        assert!(ledger.get_account("o", "l", "a").await.is_err());
        assert!(ledger.get_account("o", "l", "b").await.is_err());
        assert_eq!(ledger.lookup_calls(), 2);
    }

    #[test]
    fn test_state_store_keys_by_ledger() {
        let store = InMemoryStateStore::new();
        store.set_asset_code("ledger-1", "a", "USD");
        store.record_transaction_id("ledger-1", "tx-1");
        store.record_transaction_id("ledger-1", "tx-2");

        assert_eq!(store.asset_code("ledger-1", "a").as_deref(), Some("USD"));
        assert_eq!(store.asset_code("ledger-2", "a"), None);
        assert_eq!(store.transaction_ids("ledger-1"), vec!["tx-1", "tx-2"]);
        assert!(store.transaction_ids("ledger-2").is_empty());
    }
}
