//! Capped exponential backoff shared by the fetcher and the summarizer.

use std::time::Duration;

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped at `max`.
///
/// No jitter is applied so tests with paused time see exact delays.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(31));
    Duration::from_millis(exponential.min(max_ms))
}
