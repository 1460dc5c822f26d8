//! Types module
//!
//! Contains core data structures used throughout the engine.
//! This module organizes types into logical submodules:
//! - `account`: Account references and resolved accounts
//! - `transaction`: Double-entry requests and created transactions
//! - `batch`: Batch submission options and results
//! - `error`: Error taxonomy

pub mod account;
pub mod batch;
pub mod error;
pub mod transaction;

pub use account::{AccountRef, AccountWithAsset, LedgerAccount};
pub use batch::{BatchOptions, BatchResult, ItemResult, ItemStatus};
pub use error::{error_message, BatchError, GenerationError, LedgerError};
pub use transaction::{
    Amount, Metadata, Operation, OperationType, Transaction, TransactionRequest,
};
