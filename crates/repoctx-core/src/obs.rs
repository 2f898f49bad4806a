//! Structured observability hooks for the job lifecycle.
//!
//! - [`job_span`] builds the span a job's pipeline future is instrumented with
//! - `emit_*` functions log the key lifecycle events at a fixed `event` name
//!
//! Verbosity and format are controlled by `RUST_LOG` and the `json` switch of
//! [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// Span tagged with the job id. Attach with `tracing::Instrument::instrument`.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("repoctx.job", job_id = %job_id)
}

/// Emit event: job accepted and queued.
pub fn emit_job_submitted(job_id: &str, repo: &str) {
    info!(event = "job.submitted", job_id = %job_id, repo = %repo);
}

/// Emit event: a pipeline stage started.
pub fn emit_stage_started(job_id: &str, stage: &str) {
    info!(event = "job.stage_started", job_id = %job_id, stage = %stage);
}

/// Emit event: job reached `completed`.
pub fn emit_job_completed(job_id: &str, duration_ms: u64, verbatim: usize, summarized: usize, dropped: usize) {
    info!(
        event = "job.completed",
        job_id = %job_id,
        duration_ms = duration_ms,
        verbatim = verbatim,
        summarized = summarized,
        dropped = dropped,
    );
}

/// Emit event: job reached `failed` (warning level).
pub fn emit_job_failed(job_id: &str, duration_ms: u64, error: &dyn std::fmt::Display) {
    warn!(event = "job.failed", job_id = %job_id, duration_ms = duration_ms, error = %error);
}

/// Emit event: terminal jobs evicted from the registry.
pub fn emit_jobs_evicted(count: usize) {
    info!(event = "job.evicted", count = count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let _guard = job_span("job-1").entered();
        emit_job_submitted("job-1", "octo/repo");
        emit_stage_started("job-1", "fetch");
        emit_job_completed("job-1", 12, 3, 1, 0);
        emit_job_failed("job-1", 12, &"boom");
        emit_jobs_evicted(2);
    }
}
