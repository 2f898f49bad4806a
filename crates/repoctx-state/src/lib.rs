//! repoctx-state: job registry persistence for repoctx
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: a narrow, backend-agnostic store for analysis job records.
//!
//! ## Key Components
//!
//! - `JobStore`: async put/get/list-expired/remove contract
//! - `JobRecord` / `JobStatus`: the job state machine as persisted
//! - `MemoryJobStore`: in-memory implementation (state is lost on restart)

mod error;
pub mod fakes;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryJobStore;
pub use storage_traits::{JobId, JobRecord, JobStatus, JobStore, StorageResult};
