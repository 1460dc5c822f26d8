//! Core execution components
//!
//! This module contains the generic building blocks the generators are
//! assembled from. None of them know about ledgers or transactions:
//! - `circuit_breaker` - Failure isolation around a downstream dependency
//! - `worker_pool` - Bounded-concurrency executor for async work
//! - `progress` - Counters, throughput and ETA for long-running jobs

pub mod circuit_breaker;
pub mod progress;
pub mod worker_pool;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState,
};
pub use progress::{ProgressMetrics, ProgressOptions, ProgressReporter};
pub use worker_pool::{WorkerPool, WorkerPoolError, WorkerPoolOptions};
