//! Durable job records.
//!
//! [`StatusStore`] is the narrow interface the orchestrator writes through.
//! Every write replaces a whole record, and [`StatusStore::put_if_state`]
//! only succeeds while the stored state still matches what the writer last
//! saw, so a concurrent cancel and a worker's progress update cannot both win.

pub mod memory;
pub mod sqlite;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::worker::job::{JobCounts, JobState, ScanJob};

pub use memory::MemoryStatusStore;
pub use sqlite::SqliteStatusStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to encode job record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job '{0}' already exists")]
    AlreadyExists(String),

    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job '{id}' is {actual}, expected {expected}")]
    StateMismatch {
        id: String,
        expected: JobState,
        actual: JobState,
    },

    #[error("Job record '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Status store lock poisoned")]
    LockPoisoned,
}

pub trait StatusStore: Send + Sync {
    /// Stores a new record. Fails with `AlreadyExists` for a known id.
    fn insert(&self, job: &ScanJob) -> Result<(), StoreError>;

    /// Returns a snapshot of the record.
    fn get(&self, id: &str) -> Result<ScanJob, StoreError>;

    /// Replaces the record if its stored state equals `expected`.
    fn put_if_state(&self, job: &ScanJob, expected: JobState) -> Result<(), StoreError>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<ScanJob>, StoreError>;

    fn counts(&self) -> Result<JobCounts, StoreError> {
        let mut counts = JobCounts::default();
        for job in self.list()? {
            counts.add(job.state);
        }
        Ok(counts)
    }
}

fn newest_first(jobs: &mut [ScanJob]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
