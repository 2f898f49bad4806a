//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does so after every job).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    files_fetched: AtomicU64,
    fetch_failures: AtomicU64,
    units_summarized: AtomicU64,
    summaries_truncated: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_fetched: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            units_summarized: AtomicU64::new(0),
            summaries_truncated: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_files_fetched(&self) {
        self.files_fetched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "files_fetched", "counter incremented");
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetch_failures", "counter incremented");
    }

    /// Counts every unit that went through the summarizer, truncated or not.
    pub fn inc_units_summarized(&self) {
        self.units_summarized.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "units_summarized", "counter incremented");
    }

    pub fn inc_summaries_truncated(&self) {
        self.summaries_truncated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "summaries_truncated", "counter incremented");
    }

    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_completed", "counter incremented");
    }

    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_fetched = self.files_fetched(),
            fetch_failures = self.fetch_failures(),
            units_summarized = self.units_summarized(),
            summaries_truncated = self.summaries_truncated(),
            jobs_completed = self.jobs_completed(),
            jobs_failed = self.jobs_failed(),
        );
    }

    pub fn files_fetched(&self) -> u64 {
        self.files_fetched.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn units_summarized(&self) -> u64 {
        self.units_summarized.load(Ordering::Relaxed)
    }

    pub fn summaries_truncated(&self) -> u64 {
        self.summaries_truncated.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.files_fetched.store(0, Ordering::Relaxed);
        self.fetch_failures.store(0, Ordering::Relaxed);
        self.units_summarized.store(0, Ordering::Relaxed);
        self.summaries_truncated.store(0, Ordering::Relaxed);
        self.jobs_completed.store(0, Ordering::Relaxed);
        self.jobs_failed.store(0, Ordering::Relaxed);
    }
}
