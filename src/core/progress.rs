//! Progress reporting for long-running generation jobs
//!
//! `ProgressReporter` counts completed, failed and skipped items of a named
//! unit of work, keeps a bounded window of per-item durations, and derives
//! throughput and an ETA from them. Summaries are written through `tracing`,
//! periodically from a timer task and on demand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default cap on retained timing samples
pub const DEFAULT_SAMPLE_WINDOW: usize = 100;

/// Options for a progress reporter
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOptions {
    /// Interval of periodic summaries; zero disables the timer
    pub update_interval: Duration,

    /// Maximum number of per-item durations kept for the average
    pub sample_window: usize,

    /// Include the ETA in summaries
    pub show_eta: bool,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            sample_window: DEFAULT_SAMPLE_WINDOW,
            show_eta: true,
        }
    }
}

/// Point-in-time view of a reporter's counters
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMetrics {
    pub total_items: usize,
    pub completed_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    /// Completed items per second since `start()`
    pub throughput_per_second: f64,
    /// Mean of the retained duration samples
    pub average_item_time: Duration,
    /// Wall-clock completion estimate, once anything has completed
    pub estimated_completion: Option<SystemTime>,
    /// Time since `start()`
    pub elapsed: Duration,
}

impl ProgressMetrics {
    pub fn processed_items(&self) -> usize {
        self.completed_items + self.failed_items + self.skipped_items
    }

    pub fn remaining_items(&self) -> usize {
        self.total_items.saturating_sub(self.processed_items())
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total_items == 0 {
            return 100.0;
        }
        (self.processed_items() as f64 / self.total_items as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: usize,
    failed: usize,
    skipped: usize,
    samples: VecDeque<Duration>,
    started_at: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    label: String,
    total_items: usize,
    options: ProgressOptions,
    counters: Mutex<Counters>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for an update, starting the clock if `start` was never called
    fn lock_started(&self) -> MutexGuard<'_, Counters> {
        let mut counters = self.lock();
        counters.started_at.get_or_insert_with(Instant::now);
        counters
    }

    fn record_sample(counters: &mut Counters, window: usize, sample: Duration) {
        if window == 0 {
            return;
        }
        if counters.samples.len() == window {
            counters.samples.pop_front();
        }
        counters.samples.push_back(sample);
    }

    fn metrics(&self) -> ProgressMetrics {
        let counters = self.lock();
        let elapsed = counters
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();

        let elapsed_secs = elapsed.as_secs_f64();
        let throughput_per_second = if elapsed_secs > 0.0 {
            counters.completed as f64 / elapsed_secs
        } else {
            0.0
        };

        let average_item_time = if counters.samples.is_empty() {
            Duration::ZERO
        } else {
            counters.samples.iter().sum::<Duration>() / counters.samples.len() as u32
        };

        let processed = counters.completed + counters.failed + counters.skipped;
        let remaining = self.total_items.saturating_sub(processed);
        let estimated_completion = (throughput_per_second > 0.0).then(|| {
            SystemTime::now() + Duration::from_secs_f64(remaining as f64 / throughput_per_second)
        });

        ProgressMetrics {
            total_items: self.total_items,
            completed_items: counters.completed,
            failed_items: counters.failed,
            skipped_items: counters.skipped,
            throughput_per_second,
            average_item_time,
            estimated_completion,
            elapsed,
        }
    }

    fn emit_progress(&self) {
        let metrics = self.metrics();
        let eta_secs = if self.options.show_eta {
            metrics
                .estimated_completion
                .and_then(|eta| eta.duration_since(SystemTime::now()).ok())
                .map(|remaining| remaining.as_secs())
        } else {
            None
        };

        info!(
            label = %self.label,
            processed = metrics.processed_items(),
            total = metrics.total_items,
            failed = metrics.failed_items,
            skipped = metrics.skipped_items,
            throughput = format_args!("{:.2}/s", metrics.throughput_per_second),
            avg_item_ms = metrics.average_item_time.as_millis() as u64,
            eta_secs = ?eta_secs,
            "{}: {:.1}% complete",
            self.label,
            metrics.percent_complete()
        );
    }
}

/// Tracks progress of a named unit of work
///
/// Counters are updated through `&self`, so one reporter can be shared
/// behind an `Arc` with every callback that feeds it.
#[derive(Debug)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressReporter {
    /// Create a reporter for `total_items` items of work labelled `label`
    pub fn new(label: impl Into<String>, total_items: usize, options: ProgressOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                total_items,
                options,
                counters: Mutex::new(Counters::default()),
            }),
            ticker: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the clock and, when `update_interval` is non-zero, the summary timer
    ///
    /// The timer runs on the current Tokio runtime. Outside a runtime only
    /// manual [`force_update`](Self::force_update) summaries are available.
    pub fn start(&self) {
        self.shared.lock().started_at.get_or_insert_with(Instant::now);

        let interval = self.shared.options.update_interval;
        if interval.is_zero() {
            return;
        }

        let mut ticker = self.ticker();
        if ticker.is_some() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(label = %self.shared.label, "No Tokio runtime, periodic progress disabled");
            return;
        };

        let shared = Arc::clone(&self.shared);
        *ticker = Some(handle.spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                timer.tick().await;
                shared.emit_progress();
            }
        }));
    }

    /// Stop the timer and emit the final summary
    ///
    /// The summary is written even if the timer never ran.
    pub fn stop(&self) {
        if let Some(handle) = self.ticker().take() {
            handle.abort();
        }

        let metrics = self.shared.metrics();
        info!(
            label = %self.shared.label,
            completed = metrics.completed_items,
            failed = metrics.failed_items,
            skipped = metrics.skipped_items,
            total = metrics.total_items,
            elapsed_ms = metrics.elapsed.as_millis() as u64,
            throughput = format_args!("{:.2}/s", metrics.throughput_per_second),
            "{} finished: {} succeeded, {} failed, {} skipped",
            self.shared.label,
            metrics.completed_items,
            metrics.failed_items,
            metrics.skipped_items
        );
    }

    /// Record one completed item, with its duration when known
    pub fn report_item_completed(&self, duration: Option<Duration>) {
        let mut counters = self.shared.lock_started();
        counters.completed += 1;
        if let Some(duration) = duration {
            Shared::record_sample(&mut counters, self.shared.options.sample_window, duration);
        }
    }

    pub fn report_item_failed(&self) {
        self.shared.lock_started().failed += 1;
    }

    pub fn report_item_skipped(&self) {
        self.shared.lock_started().skipped += 1;
    }

    /// Record `count` items completed in `total_duration`
    ///
    /// The per-item average is added as a sample for each item, bounded by
    /// the sample window.
    pub fn report_batch_completed(&self, count: usize, total_duration: Duration) {
        if count == 0 {
            return;
        }

        let window = self.shared.options.sample_window;
        let per_item = match u32::try_from(count) {
            Ok(count) => total_duration / count,
            Err(_) => total_duration.div_f64(count as f64),
        };
        let mut counters = self.shared.lock_started();
        counters.completed += count;
        for _ in 0..count.min(window) {
            Shared::record_sample(&mut counters, window, per_item);
        }
    }

    /// Emit a progress summary now
    pub fn force_update(&self) {
        self.shared.emit_progress();
    }

    pub fn metrics(&self) -> ProgressMetrics {
        self.shared.metrics()
    }

    /// True once every item is completed, failed or skipped
    pub fn is_complete(&self) -> bool {
        let counters = self.shared.lock();
        counters.completed + counters.failed + counters.skipped >= self.shared.total_items
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker().take() {
            handle.abort();
        }
    }
}
