//! Trait contract tests for JobStore.
//!
//! These tests verify the behavioral contract of the job registry using the
//! in-memory store. Any conforming implementation must pass these.

use chrono::{Duration, Utc};
use repoctx_state::fakes::MemoryJobStore;
use repoctx_state::storage_traits::*;
use repoctx_state::StorageError;

#[tokio::test]
async fn put_then_get_round_trip() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new());
    store.put(record.clone()).await.unwrap();

    let fetched = store.get(&record.job_id).await.unwrap();
    assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn get_unknown_id_is_none() {
    let store = MemoryJobStore::new();
    let fetched = store.get(&JobId::from("missing")).await.unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
async fn put_follows_lifecycle() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new());
    let id = record.job_id.clone();

    store.put(record.clone()).await.unwrap();
    let processing = record.mark_processing();
    store.put(processing.clone()).await.unwrap();
    let done = processing.mark_completed(serde_json::json!({"ok": true}));
    store.put(done).await.unwrap();

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result, Some(serde_json::json!({"ok": true})));
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn completed_job_cannot_be_rewritten() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new()).mark_processing();
    store.put(record.clone()).await.unwrap();
    store
        .put(record.clone().mark_completed(serde_json::json!(1)))
        .await
        .unwrap();

    let err = store.put(record.mark_failed("late failure")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
}

#[tokio::test]
async fn completed_result_cannot_be_replaced() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new()).mark_processing();
    store.put(record.clone()).await.unwrap();
    store
        .put(record.clone().mark_completed(serde_json::json!("A")))
        .await
        .unwrap();

    let err = store
        .put(record.clone().mark_completed(serde_json::json!("B")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    let stored = store.get(&record.job_id).await.unwrap().unwrap();
    assert_eq!(stored.result, Some(serde_json::json!("A")));
}

#[tokio::test]
async fn failed_job_cannot_be_failed_again() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new());
    store.put(record.clone()).await.unwrap();
    store.put(record.clone().mark_failed("first")).await.unwrap();

    let err = store.put(record.clone().mark_failed("second")).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
    let stored = store.get(&record.job_id).await.unwrap().unwrap();
    assert_eq!(stored.error.as_deref(), Some("first"));
}

#[tokio::test]
async fn pending_cannot_jump_to_completed() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new());
    store.put(record.clone()).await.unwrap();

    let err = store
        .put(record.mark_completed(serde_json::json!(null)))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
}

#[tokio::test]
async fn list_expired_only_returns_old_terminal_jobs() {
    let store = MemoryJobStore::new();

    let pending = JobRecord::pending(JobId::from("a-pending"));
    let running = JobRecord::pending(JobId::from("b-running")).mark_processing();
    let mut old_done = JobRecord::pending(JobId::from("c-done"))
        .mark_processing()
        .mark_completed(serde_json::json!({}));
    old_done.completed_at = Some(Utc::now() - Duration::hours(2));
    let fresh_failed = JobRecord::pending(JobId::from("d-failed"))
        .mark_processing()
        .mark_failed("x");

    for r in [pending, running, old_done, fresh_failed] {
        store.put(r).await.unwrap();
    }

    let expired = store
        .list_expired(Utc::now(), Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(expired, vec![JobId::from("c-done")]);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let store = MemoryJobStore::new();
    let record = JobRecord::pending(JobId::new());
    store.put(record.clone()).await.unwrap();

    store.remove(&record.job_id).await.unwrap();
    store.remove(&record.job_id).await.unwrap();
    assert!(store.get(&record.job_id).await.unwrap().is_none());
    assert!(store.is_empty());
}
