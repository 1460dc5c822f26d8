//! Ledger Transaction Generator Library
//! # Overview
//!
//! This library generates realistic double-entry transaction traffic against a
//! ledger service: one funding deposit per account followed by peer-to-peer
//! transfers inside each asset, submitted under bounded concurrency with
//! retries and a circuit breaker around the ledger.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (requests, transactions, batch results, errors)
//! - [`core`] - Generic execution components:
//!   - [`core::circuit_breaker`] - Failure isolation around the ledger
//!   - [`core::worker_pool`] - Bounded-concurrency async executor
//!   - [`core::progress`] - Throughput and ETA reporting
//! - [`ledger`] - Ledger client interface, batch submission, breaker decorator
//!   and in-memory implementations
//! - [`strategy`] - Pluggable amount and target selection
//! - [`generation`] - Deposit/transfer generators and the run orchestrator
//! - [`io`] - CSV account lists and transaction output
//! - [`cli`] - CLI arguments parsing
//! - [`simulation`] - Full runs against the in-memory ledger
//!
//! # Invariants
//!
//! - Every generated request is balanced: its debits equal its credits and
//!   every leg uses one asset code.
//! - Transactions never cross asset partitions.
//! - Failures are counted once per distinct error message and never abort a run.

// Module declarations
pub mod cli;
pub mod core;
pub mod generation;
pub mod io;
pub mod ledger;
pub mod simulation;
pub mod strategy;
pub mod types;

pub use core::{CircuitBreaker, ProgressReporter, WorkerPool};
pub use generation::{GenerationRequest, TransactionOrchestrator};
pub use ledger::LedgerClient;
pub use types::{
    AccountWithAsset, BatchOptions, BatchResult, GenerationError, LedgerError, Transaction,
    TransactionRequest,
};
