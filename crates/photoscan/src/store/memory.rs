use std::collections::HashMap;
use std::sync::RwLock;

use super::{newest_first, StatusStore, StoreError};
use crate::worker::job::{JobState, ScanJob};

/// Process-local store with the same semantics as the durable one.
#[derive(Default)]
pub struct MemoryStatusStore {
    jobs: RwLock<HashMap<String, ScanJob>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn insert(&self, job: &ScanJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<ScanJob, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put_if_state(&self, job: &ScanJob, expected: JobState) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::NotFound(job.id.clone()))?;
        if current.state != expected {
            return Err(StoreError::StateMismatch {
                id: job.id.clone(),
                expected,
                actual: current.state,
            });
        }
        *current = job.clone();
        Ok(())
    }

    fn list(&self) -> Result<Vec<ScanJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut all: Vec<ScanJob> = jobs.values().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }
}
