//! Caller-facing and pipeline-level error types.
//!
//! Stage-local errors live next to their stage (`SourceError`, `FetchError`,
//! `SplitError`, `GenerateError`, `SummarizeError`); this module holds the
//! errors that cross the orchestrator boundary.

use repoctx_state::{JobStatus, StorageError};

use crate::source::SourceError;

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable {key} has unparsable value {value:?}")]
    InvalidEnv { key: String, value: String },
}

/// Errors returned by the orchestrator's external operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("job {job_id} is not ready (status: {status})")]
    NotReady { job_id: String, status: JobStatus },

    #[error("stored result for job {job_id} is unreadable: {reason}")]
    CorruptResult { job_id: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for orchestrator operations.
pub type JobResult<T> = std::result::Result<T, JobError>;

/// An error that stops a job from producing any usable result.
///
/// The orchestrator records its `Display` form as the job's `error`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid repository reference {input:?}: {reason}")]
    InvalidRepo { input: String, reason: String },

    #[error("could not open repository source: {0}")]
    Source(#[source] SourceError),

    #[error("could not list repository tree: {0}")]
    Tree(#[source] SourceError),

    #[error("repository has no fetchable text files")]
    NoCandidates,

    #[error("no content units could be produced from {attempted} fetched files")]
    NoContent { attempted: usize },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("could not encode result: {0}")]
    Encode(#[from] serde_json::Error),
}
