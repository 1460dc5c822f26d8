//! Circuit-breaker decorator for ledger clients
//!
//! `GuardedLedgerClient` routes every `create_transaction` call of an inner
//! client through a shared [`CircuitBreaker`]. Because batch submission is
//! built on `create_transaction`, whole batches are protected without the
//! generators knowing a breaker exists.
//!
//! Account lookups bypass the breaker: they have their own fallback path and
//! a missing account says nothing about the health of transaction creation.

use std::sync::Arc;

use async_trait::async_trait;

use super::LedgerClient;
use crate::core::{CircuitBreaker, CircuitBreakerError};
use crate::types::{LedgerAccount, LedgerError, Transaction, TransactionRequest};

/// Ledger client whose transaction calls go through a circuit breaker
#[derive(Clone)]
pub struct GuardedLedgerClient {
    inner: Arc<dyn LedgerClient>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedLedgerClient {
    pub fn new(inner: Arc<dyn LedgerClient>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl std::fmt::Debug for GuardedLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedLedgerClient")
            .field("breaker", &self.breaker.name())
            .field("state", &self.breaker.state())
            .finish()
    }
}

impl From<CircuitBreakerError<LedgerError>> for LedgerError {
    fn from(error: CircuitBreakerError<LedgerError>) -> Self {
        match error {
            CircuitBreakerError::Open { name } => LedgerError::CircuitOpen { name },
            CircuitBreakerError::Operation(error) => error,
        }
    }
}

#[async_trait]
impl LedgerClient for GuardedLedgerClient {
    async fn get_account(
        &self,
        organization_id: &str,
        ledger_id: &str,
        account_id: &str,
    ) -> Result<LedgerAccount, LedgerError> {
        self.inner
            .get_account(organization_id, ledger_id, account_id)
            .await
    }

    async fn create_transaction(
        &self,
        organization_id: &str,
        ledger_id: &str,
        request: &TransactionRequest,
    ) -> Result<Transaction, LedgerError> {
        let inner = &self.inner;
        self.breaker
            .execute(|| inner.create_transaction(organization_id, ledger_id, request))
            .await
            .map_err(LedgerError::from)
    }
}
