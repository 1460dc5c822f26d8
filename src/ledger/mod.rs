//! Ledger collaborator interfaces
//!
//! The engine talks to the outside world only through the traits defined
//! here. They are injected into the generators and the orchestrator, so every
//! boundary can be replaced by a test double.
//!
//! - [`LedgerClient`] - the remote ledger service
//! - [`BatchObserver`] - per-item side-effect channel out of a batch submission
//! - [`AccountAssetStore`] - remembered account → asset code mappings
//! - [`TransactionIdSink`] - receives the ids of created transactions
//!
//! Implementations:
//! - `batch` - Bounded, retrying batch submission used by default
//! - `guarded` - Circuit-breaker decorator for any client
//! - `memory` - In-memory ledger and state store

use async_trait::async_trait;

use crate::types::{
    BatchError, BatchOptions, BatchResult, LedgerAccount, LedgerError, Transaction,
    TransactionRequest,
};

pub mod batch;
pub mod guarded;
pub mod memory;

pub use batch::submit_batch;
pub use guarded::GuardedLedgerClient;
pub use memory::{InMemoryLedger, InMemoryStateStore};

/// Remote ledger service
///
/// Implementations must be cheap to call concurrently: the batch submission
/// keeps up to `BatchOptions::concurrency` calls in flight at once.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch an account, mainly to learn its asset code
    async fn get_account(
        &self,
        organization_id: &str,
        ledger_id: &str,
        account_id: &str,
    ) -> Result<LedgerAccount, LedgerError>;

    /// Create a single transaction
    async fn create_transaction(
        &self,
        organization_id: &str,
        ledger_id: &str,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError>;

    /// Create many transactions under bounded concurrency
    ///
    /// The default implementation is [`submit_batch`] on top of
    /// [`create_transaction`](LedgerClient::create_transaction).
    async fn create_transactions_batch(
        &self,
        organization_id: &str,
        ledger_id: &str,
        requests: Vec<TransactionRequest>,
        options: &BatchOptions,
        observer: &dyn BatchObserver,
    ) -> Result<BatchResult, BatchError> {
        submit_batch(self, organization_id, ledger_id, requests, options, observer).await
    }
}

/// Observer notified as each batch item settles
///
/// This is the only side-effect channel out of a batch; the batch's own
/// outcome is the returned [`BatchResult`]. Items settle concurrently, so
/// implementations must tolerate interleaved calls.
pub trait BatchObserver: Send + Sync {
    fn on_transaction_success(
        &self,
        _request: &TransactionRequest,
        _index: usize,
        _transaction: &Transaction,
    ) {
    }

    fn on_transaction_error(&self, _request: &TransactionRequest, _index: usize, _error: &LedgerError) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Remembered asset codes, keyed by ledger and account
pub trait AccountAssetStore: Send + Sync {
    fn asset_code(&self, ledger_id: &str, account_id: &str) -> Option<String>;

    fn set_asset_code(&self, ledger_id: &str, account_id: &str, asset_code: &str);
}

/// Receiver of created transaction ids
pub trait TransactionIdSink: Send + Sync {
    fn record_transaction_id(&self, ledger_id: &str, transaction_id: &str);
}
