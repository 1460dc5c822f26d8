//! Error types for the transaction generation engine
//!
//! This module defines the error taxonomy used across the engine. Errors are
//! split by where they originate so callers can react to each class
//! differently.
//!
//! # Error Categories
//!
//! - **Ledger Errors** ([`LedgerError`]): failures reported by (or on the way to)
//!   the remote ledger service, including the circuit-open rejection
//! - **Generation Errors** ([`GenerationError`]): structural precondition
//!   failures detected locally, plus I/O and CSV errors of the driver
//! - **Batch Errors** ([`BatchError`]): a whole batch submission rejected,
//!   optionally carrying the partial per-item results gathered before it stopped

use thiserror::Error;

use super::batch::ItemResult;

/// Error returned by a ledger client operation
///
/// Each variant maps to one failure class of the remote service. The
/// [`is_retryable`](LedgerError::is_retryable) classification drives the retry
/// loop of the batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The request never reached the ledger (connection refused, reset, DNS)
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure
        message: String,
    },

    /// The ledger answered with a non-success status
    #[error("Ledger returned status {status}: {message}")]
    Upstream {
        /// HTTP-like status code
        status: u16,
        /// Message returned by the ledger
        message: String,
    },

    /// The request did not complete in time
    #[error("Request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time spent waiting before giving up
        elapsed_ms: u64,
    },

    /// The referenced account does not exist in the ledger
    #[error("Account {account_id} not found")]
    AccountNotFound {
        /// The account that was looked up
        account_id: String,
    },

    /// The call was rejected by an open circuit breaker without reaching the ledger
    #[error("Circuit breaker '{name}' is OPEN")]
    CircuitOpen {
        /// Name of the breaker that rejected the call
        name: String,
    },

    /// The request was rejected before submission (unbalanced, mixed assets, ...)
    #[error("Invalid transaction request: {message}")]
    InvalidRequest {
        /// Why the request is invalid
        message: String,
    },
}

impl LedgerError {
    /// Create a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        LedgerError::Transport {
            message: message.into(),
        }
    }

    /// Create an Upstream error
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        LedgerError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account_id: impl Into<String>) -> Self {
        LedgerError::AccountNotFound {
            account_id: account_id.into(),
        }
    }

    /// Create a CircuitOpen error
    pub fn circuit_open(name: impl Into<String>) -> Self {
        LedgerError::CircuitOpen { name: name.into() }
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        LedgerError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Transport failures, timeouts and 5xx/429 responses are transient.
    /// Client-side rejections and circuit-open rejections are not: retrying a
    /// call the breaker refused would only hammer a dependency known to be down.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport { .. } | LedgerError::Timeout { .. } => true,
            LedgerError::Upstream { status, .. } => *status >= 500 || *status == 429,
            LedgerError::AccountNotFound { .. }
            | LedgerError::CircuitOpen { .. }
            | LedgerError::InvalidRequest { .. } => false,
        }
    }

    /// Whether the breaker rejected this call before the ledger was reached
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, LedgerError::CircuitOpen { .. })
    }
}

/// Normalize a ledger error into the message used for error accounting
///
/// Failures sharing one root cause collapse to the same string, so counting
/// unique messages counts root causes rather than affected items. Per-request
/// details such as elapsed time are deliberately left out.
pub fn error_message(error: &LedgerError) -> String {
    match error {
        LedgerError::Transport { message } => format!("transport: {message}"),
        LedgerError::Upstream { status, message } => format!("status {status}: {message}"),
        LedgerError::Timeout { .. } => "request timed out".to_string(),
        LedgerError::AccountNotFound { .. } => "account not found".to_string(),
        LedgerError::CircuitOpen { .. } => "Circuit breaker is OPEN".to_string(),
        LedgerError::InvalidRequest { message } => format!("invalid request: {message}"),
    }
}

/// Batch-level failure of a batch submission
///
/// Returned when the batch call itself rejects instead of producing a
/// [`BatchResult`](super::batch::BatchResult), for example when
/// `stop_on_error` aborted the remaining dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Batch submission failed: {message}")]
pub struct BatchError {
    /// Description of the batch failure
    pub message: String,

    /// Per-item results gathered before the batch stopped, if any
    pub results: Option<Vec<ItemResult>>,
}

impl BatchError {
    /// Create a BatchError without partial results
    pub fn new(message: impl Into<String>) -> Self {
        BatchError {
            message: message.into(),
            results: None,
        }
    }

    /// Create a BatchError carrying the partial results gathered so far
    pub fn with_results(message: impl Into<String>, results: Vec<ItemResult>) -> Self {
        BatchError {
            message: message.into(),
            results: Some(results),
        }
    }
}

/// Error type for generation runs and the driver around them
///
/// None of these are fatal to the engine: the orchestrator and generators log
/// and count them, then return empty or partial results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Fewer accounts than a generation run needs
    #[error("At least 2 accounts are required to generate transactions, got {found}")]
    InsufficientAccounts {
        /// Number of accounts supplied
        found: usize,
    },

    /// Source and target of a single transaction use different assets
    #[error(
        "Asset mismatch: account {source_account} uses {source_asset} but account {target_account} uses {target_asset}"
    )]
    AssetMismatch {
        /// Debited account
        source_account: String,
        /// Asset of the debited account
        source_asset: String,
        /// Credited account
        target_account: String,
        /// Asset of the credited account
        target_asset: String,
    },

    /// A ledger call failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A batch submission failed as a whole
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// I/O error while reading input or writing output
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl GenerationError {
    /// Create an AssetMismatch error
    pub fn asset_mismatch(
        source_account: impl Into<String>,
        source_asset: impl Into<String>,
        target_account: impl Into<String>,
        target_asset: impl Into<String>,
    ) -> Self {
        GenerationError::AssetMismatch {
            source_account: source_account.into(),
            source_asset: source_asset.into(),
            target_account: target_account.into(),
            target_asset: target_asset.into(),
        }
    }
}

// Conversion from io::Error to GenerationError
impl From<std::io::Error> for GenerationError {
    fn from(error: std::io::Error) -> Self {
        GenerationError::Io {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to GenerationError
impl From<csv::Error> for GenerationError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        GenerationError::Parse {
            line,
            message: error.to_string(),
        }
    }
}
