//! In-memory job store
//!
//! `MemoryJobStore` satisfies the [`JobStore`] contract without any external
//! dependencies. It is the default registry: job state does not survive a
//! process restart.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory job registry backed by a `HashMap<job_id, JobRecord>`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, record: JobRecord) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.get(&record.job_id.0) {
            if !existing.status.can_transition_to(record.status) {
                return Err(StorageError::InvalidTransition {
                    job_id: record.job_id.0.clone(),
                    from: existing.status.to_string(),
                    to: record.status.to_string(),
                });
            }
        }
        jobs.insert(record.job_id.0.clone(), record);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> StorageResult<Option<JobRecord>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.get(&job_id.0).cloned())
    }

    async fn list_expired(&self, now: DateTime<Utc>, ttl: Duration) -> StorageResult<Vec<JobId>> {
        let jobs = self.jobs.lock().unwrap();
        let mut expired: Vec<JobId> = jobs
            .values()
            .filter(|r| r.is_expired(now, ttl))
            .map(|r| r.job_id.clone())
            .collect();
        expired.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(expired)
    }

    async fn remove(&self, job_id: &JobId) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.remove(&job_id.0).is_some() {
            tracing::debug!(job_id = %job_id, "job record removed");
        }
        Ok(())
    }
}
