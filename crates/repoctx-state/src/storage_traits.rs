//! Storage trait definitions for the repoctx job registry
//!
//! - `JobStore`: keyed persistence for [`JobRecord`]s (put/get/list-expired/remove)
//!
//! The trait is async and backend-agnostic so the orchestrator can run against the
//! in-memory store from the `fakes` module or a networked store without changes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Unique identifier for an analysis job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random JobId
    pub fn new() -> Self {
        JobId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Lifecycle state of a job.
///
/// `Pending -> Processing -> Completed | Failed`. A pending job may also fail
/// directly when its driving task cannot start the pipeline at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge. Non-terminal states may be
    /// re-written in place; terminal states have no outgoing edges at all.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Pending) | (Processing, Processing) => true,
            (Pending, Processing) | (Pending, Failed) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full job record as held by the registry.
///
/// `error` is only populated when `status == Failed`, `result` only when
/// `status == Completed`. The result is stored as JSON so that any backend can
/// hold it without knowing the pipeline's result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl JobRecord {
    /// A fresh pending record.
    pub fn pending(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn mark_processing(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self
    }

    pub fn mark_completed(mut self, result: serde_json::Value) -> Self {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.error = None;
        self
    }

    pub fn mark_failed(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.result = None;
        self
    }

    /// Whether this record is terminal and finished more than `ttl` before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (self.status.is_terminal(), self.completed_at) {
            (true, Some(done)) => now - done >= ttl,
            _ => false,
        }
    }
}

/// Job registry.
///
/// Guarantees:
/// - `put` is an upsert keyed by `job_id`.
/// - `put` rejects a write whose status is not reachable from the stored status
///   (terminal records are immutable).
/// - `list_expired` only ever returns terminal jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, record: JobRecord) -> StorageResult<()>;

    /// Fetch a record. `Ok(None)` when the id is unknown.
    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>>;

    /// Ids of terminal jobs completed at least `ttl` before `now`.
    async fn list_expired(&self, now: DateTime<Utc>, ttl: Duration) -> StorageResult<Vec<JobId>>;

    /// Remove a record. No-op if absent.
    async fn remove(&self, job_id: &JobId) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            for next in [JobStatus::Pending, JobStatus::Processing] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_terminal_states_cannot_be_rewritten() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_forward_edges_are_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_pending_record_is_never_expired() {
        let record = JobRecord::pending(JobId::new());
        assert!(!record.is_expired(Utc::now() + Duration::days(30), Duration::seconds(1)));
    }

    #[test]
    fn test_failed_record_expires_after_ttl() {
        let record = JobRecord::pending(JobId::new())
            .mark_processing()
            .mark_failed("boom");
        let done = record.completed_at.unwrap();
        assert!(!record.is_expired(done + Duration::seconds(5), Duration::seconds(10)));
        assert!(record.is_expired(done + Duration::seconds(10), Duration::seconds(10)));
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
