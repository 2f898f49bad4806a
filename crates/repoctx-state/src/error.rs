//! Error types for repoctx-state

use thiserror::Error;

/// Errors produced by [`JobStore`](crate::JobStore) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No record exists for the given job id
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// The write would move a job out of a terminal state or skip a state
    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// Backend-specific failure (network store, serialization, ...)
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = StorageError::InvalidTransition {
            job_id: "abc".to_string(),
            from: "completed".to_string(),
            to: "processing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("completed -> processing"));
    }
}
