//! Bounded-concurrency executor for asynchronous work
//!
//! This module provides the `WorkerPool` struct, which runs an async worker
//! over a list of inputs while keeping at most `concurrency` invocations in
//! flight.
//!
//! # Design
//!
//! Scheduling is cooperative: every worker future is polled on the calling
//! task through a `FuturesUnordered` set, nothing is spawned. Concurrency
//! therefore bounds the number of pending I/O operations, not CPU parallelism,
//! and workers are free to borrow from the caller's stack.
//!
//! ```text
//! items ──▶ [ in flight: ≤ concurrency ] ──▶ results
//!              ▲                 │
//!              └── next item ◀───┘  (dispatched as each one settles)
//! ```

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;

/// Options controlling a worker pool run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolOptions {
    /// Maximum number of worker invocations in flight (values below 1 act as 1)
    pub concurrency: usize,

    /// Place each result at its input's index instead of in completion order
    pub preserve_order: bool,

    /// Capture failures in place and keep going instead of aborting the run
    pub continue_on_error: bool,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            preserve_order: true,
            continue_on_error: true,
        }
    }
}

/// Error returned when a run aborts on its first failure
///
/// Only produced with `continue_on_error = false`. Items still in flight when
/// the failure arrived are dropped; items not yet dispatched never run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerPoolError<R, E> {
    #[error("worker pool aborted at item {index}: {error}")]
    Aborted {
        /// Input index of the failing item
        index: usize,
        /// The failing item's error
        #[source]
        error: E,
        /// Items that succeeded before the abort, as `(input index, result)`
        completed: Vec<(usize, R)>,
    },
}

impl<R, E> WorkerPoolError<R, E> {
    /// The error that aborted the run
    pub fn into_error(self) -> E {
        match self {
            WorkerPoolError::Aborted { error, .. } => error,
        }
    }
}

/// Bounded-concurrency executor
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool {
    options: WorkerPoolOptions,
}

impl WorkerPool {
    pub fn new(options: WorkerPoolOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WorkerPoolOptions {
        &self.options
    }

    /// Run `worker` over every item
    ///
    /// # Arguments
    ///
    /// * `items` - Inputs, consumed in order as slots free up
    /// * `worker` - Async function invoked once per item
    ///
    /// # Returns
    ///
    /// * `Ok(results)` - one `Result` per item; indexed like `items` when
    ///   `preserve_order` is set, in completion order otherwise
    /// * `Err(WorkerPoolError::Aborted)` - the first failure, when
    ///   `continue_on_error` is not set
    pub async fn run<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        mut worker: F,
    ) -> Result<Vec<Result<R, E>>, WorkerPoolError<R, E>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let total = items.len();
        let concurrency = self.options.concurrency.max(1);
        let mut pending = items.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        let mut dispatch = |index: usize, item: T| {
            let future = worker(item);
            async move { (index, future.await) }
        };

        for (index, item) in pending.by_ref().take(concurrency) {
            in_flight.push(dispatch(index, item));
        }

        let mut slots: Vec<Option<Result<R, E>>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        let mut completion_order = Vec::with_capacity(total);

        while let Some((index, outcome)) = in_flight.next().await {
            match outcome {
                Err(error) if !self.options.continue_on_error => {
                    let completed = slots
                        .into_iter()
                        .enumerate()
                        .filter_map(|(i, slot)| match slot {
                            Some(Ok(value)) => Some((i, value)),
                            _ => None,
                        })
                        .collect();
                    return Err(WorkerPoolError::Aborted {
                        index,
                        error,
                        completed,
                    });
                }
                outcome => slots[index] = Some(outcome),
            }
            completion_order.push(index);

            if let Some((next_index, item)) = pending.next() {
                in_flight.push(dispatch(next_index, item));
            }
        }

        let results = if self.options.preserve_order {
            slots.into_iter().flatten().collect()
        } else {
            completion_order
                .into_iter()
                .filter_map(|index| slots[index].take())
                .collect()
        };

        Ok(results)
    }
}
