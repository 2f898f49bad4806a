//! Concurrent, rate-limit aware fetching.
//!
//! [`FetchGate`] is the process-wide admission control: a semaphore bounding
//! in-flight requests across every job plus the last rate-limit signal seen.
//! [`RateLimitedFetcher`] binds a gate to one repository's [`SourceClient`].

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::metrics::METRICS;
use crate::retry::backoff_delay;
use crate::source::{
    FetchTarget, Issue, RateLimitSignal, SourceClient, SourceError, SourceResponse, TreeEntry,
};

/// Content of one fetched target.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    pub path: String,
    /// `None` when the source withheld the body (binary or oversized).
    pub content: Option<Vec<u8>>,
    pub size: u64,
    pub fetched_at: DateTime<Utc>,
}

impl RawFile {
    pub fn new(path: impl Into<String>, content: Option<Vec<u8>>) -> Self {
        let size = content.as_ref().map(|c| c.len() as u64).unwrap_or(0);
        Self {
            path: path.into(),
            content,
            size,
            fetched_at: Utc::now(),
        }
    }

    fn from_response(target: &FetchTarget, response: SourceResponse) -> Self {
        Self {
            path: target.label().to_string(),
            content: response.body,
            size: response.size,
            fetched_at: Utc::now(),
        }
    }
}

/// A target that could not be fetched. Never aborts sibling requests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("fetch {path} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub path: String,
    pub attempts: u32,
    pub source: SourceError,
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        self.source == SourceError::NotFound
    }
}

const UNKNOWN_REMAINING: u64 = u64::MAX;
const NO_RESET: i64 = i64::MIN;

static GLOBAL_GATE: OnceLock<Arc<FetchGate>> = OnceLock::new();

/// Admission control shared by all fetches in the process.
#[derive(Debug)]
pub struct FetchGate {
    permits: Semaphore,
    max_concurrency: usize,
    remaining: AtomicU64,
    reset_at: AtomicI64,
}

impl FetchGate {
    pub fn new(max_concurrency: usize) -> Arc<Self> {
        let max_concurrency = max_concurrency.max(1);
        Arc::new(Self {
            permits: Semaphore::new(max_concurrency),
            max_concurrency,
            remaining: AtomicU64::new(UNKNOWN_REMAINING),
            reset_at: AtomicI64::new(NO_RESET),
        })
    }

    /// The process-wide gate, created on first use with `max_concurrency`.
    /// Later callers get the same gate regardless of the value they pass.
    pub fn global(max_concurrency: usize) -> Arc<Self> {
        Arc::clone(GLOBAL_GATE.get_or_init(|| Self::new(max_concurrency)))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Last remaining-quota value reported by the source.
    pub fn remaining(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Relaxed) {
            UNKNOWN_REMAINING => None,
            n => Some(n),
        }
    }

    pub fn observe(&self, signal: RateLimitSignal) {
        self.remaining.store(signal.remaining, Ordering::Relaxed);
        self.store_reset(signal.reset_at);
    }

    pub fn mark_exhausted(&self, reset_at: Option<DateTime<Utc>>) {
        self.remaining.store(0, Ordering::Relaxed);
        self.store_reset(reset_at);
    }

    /// A request succeeded without a quota signal: the quota is no longer
    /// known to be zero.
    pub fn clear_exhausted(&self) {
        let _ = self.remaining.compare_exchange(
            0,
            UNKNOWN_REMAINING,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    fn store_reset(&self, reset_at: Option<DateTime<Utc>>) {
        let secs = reset_at.map(|t| t.timestamp()).unwrap_or(NO_RESET);
        self.reset_at.store(secs, Ordering::Relaxed);
    }

    /// Quota is known to be zero and its reset time (if reported) has not passed.
    pub fn is_exhausted(&self) -> bool {
        if self.remaining.load(Ordering::Relaxed) != 0 {
            return false;
        }
        match self.reset_at.load(Ordering::Relaxed) {
            NO_RESET => true,
            secs => Utc::now().timestamp() < secs,
        }
    }
}

/// Fetches targets from one repository under a shared [`FetchGate`].
pub struct RateLimitedFetcher {
    source: Arc<dyn SourceClient>,
    gate: Arc<FetchGate>,
    config: FetchConfig,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn SourceClient>, gate: Arc<FetchGate>, config: FetchConfig) -> Self {
        Self {
            source,
            gate,
            config,
        }
    }

    pub fn gate(&self) -> &Arc<FetchGate> {
        &self.gate
    }

    /// Fetch every target with at most `max_concurrency` requests in flight.
    ///
    /// Output index `i` corresponds to input index `i`. Per-target failures are
    /// returned in place and never cancel the other requests.
    pub async fn fetch_many(
        &self,
        targets: &[FetchTarget],
        max_concurrency: usize,
    ) -> Vec<Result<RawFile, FetchError>> {
        let requests: Vec<_> = targets
            .iter()
            .map(|target| async move {
                self.fetch_one(target)
                    .await
                    .map(|response| RawFile::from_response(target, response))
            })
            .collect();
        stream::iter(requests)
            .buffered(max_concurrency.max(1))
            .collect()
            .await
    }

    /// Fetch and decode the normalized tree listing.
    pub async fn list_tree(&self) -> Result<Vec<TreeEntry>, FetchError> {
        self.fetch_json(&FetchTarget::tree()).await
    }

    /// Fetch and decode the open-issue listing.
    pub async fn list_issues(&self) -> Result<Vec<Issue>, FetchError> {
        self.fetch_json(&FetchTarget::issues()).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, target: &FetchTarget) -> Result<T, FetchError> {
        let response = self.fetch_one(target).await?;
        let body = response.body.unwrap_or_default();
        serde_json::from_slice(&body).map_err(|e| FetchError {
            path: target.label().to_string(),
            attempts: 1,
            source: SourceError::Decode(e.to_string()),
        })
    }

    async fn fetch_one(&self, target: &FetchTarget) -> Result<SourceResponse, FetchError> {
        let attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.wait_for_quota(target).await;

            let result = {
                let _permit = self.gate.permits.acquire().await.map_err(|_| FetchError {
                    path: target.label().to_string(),
                    attempts: attempt,
                    source: SourceError::Transport("fetch gate closed".into()),
                })?;
                self.source.get(target).await
            };

            let err = match result {
                Ok(response) => {
                    match response.rate_limit {
                        Some(signal) => self.gate.observe(signal),
                        None => self.gate.clear_exhausted(),
                    }
                    METRICS.inc_files_fetched();
                    return Ok(response);
                }
                Err(err) => err,
            };

            if let SourceError::RateLimited { reset_at } = &err {
                self.gate.mark_exhausted(*reset_at);
            }
            let retryable = err.is_transient() || matches!(err, SourceError::RateLimited { .. });
            if !retryable || attempt >= attempts {
                if err != SourceError::NotFound {
                    warn!(path = target.label(), attempt, error = %err, "fetch failed");
                }
                METRICS.inc_fetch_failures();
                return Err(FetchError {
                    path: target.label().to_string(),
                    attempts: attempt,
                    source: err,
                });
            }

            if err.is_transient() {
                let delay = backoff_delay(
                    attempt - 1,
                    self.config.backoff_base_ms,
                    self.config.backoff_max_ms,
                );
                debug!(
                    path = target.label(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying fetch"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Defer an unstarted request while the shared quota is exhausted.
    async fn wait_for_quota(&self, target: &FetchTarget) {
        let mut defers = 0;
        while self.gate.is_exhausted() && defers < self.config.max_rate_limit_defers {
            let delay = backoff_delay(
                defers,
                self.config.backoff_base_ms,
                self.config.backoff_max_ms,
            );
            debug!(
                path = target.label(),
                defers,
                delay_ms = delay.as_millis() as u64,
                "rate limit exhausted, deferring"
            );
            tokio::time::sleep(delay).await;
            defers += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_tracks_rate_limit() {
        let gate = FetchGate::new(3);
        assert_eq!(gate.remaining(), None);
        assert!(!gate.is_exhausted());

        gate.observe(RateLimitSignal {
            remaining: 10,
            reset_at: None,
        });
        assert_eq!(gate.remaining(), Some(10));
        assert!(!gate.is_exhausted());

        gate.mark_exhausted(None);
        assert!(gate.is_exhausted());
    }

    #[test]
    fn test_exhaustion_lifts_after_reset_time() {
        let gate = FetchGate::new(1);
        gate.mark_exhausted(Some(Utc::now() - chrono::Duration::seconds(5)));
        assert!(!gate.is_exhausted());
        gate.mark_exhausted(Some(Utc::now() + chrono::Duration::seconds(60)));
        assert!(gate.is_exhausted());
    }

    #[test]
    fn test_clear_exhausted_only_resets_zero() {
        let gate = FetchGate::new(1);
        gate.observe(RateLimitSignal {
            remaining: 42,
            reset_at: None,
        });
        gate.clear_exhausted();
        assert_eq!(gate.remaining(), Some(42));

        gate.mark_exhausted(None);
        gate.clear_exhausted();
        assert_eq!(gate.remaining(), None);
        assert!(!gate.is_exhausted());
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let gate = FetchGate::new(0);
        assert_eq!(gate.max_concurrency(), 1);
        assert_eq!(gate.available_permits(), 1);
    }

    #[test]
    fn test_global_gate_is_shared() {
        let a = FetchGate::global(10);
        let b = FetchGate::global(99);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_raw_file_size_from_content() {
        let file = RawFile::new("a.txt", Some(b"hello".to_vec()));
        assert_eq!(file.size, 5);
        assert_eq!(RawFile::new("b.bin", None).size, 0);
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError {
            path: "src/a.rs".into(),
            attempts: 3,
            source: SourceError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "fetch src/a.rs failed after 3 attempt(s): request timed out"
        );
        assert!(!err.is_not_found());
    }
}
