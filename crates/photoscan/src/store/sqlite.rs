use std::path::Path;

use chrono::SecondsFormat;

use super::{StatusStore, StoreError};
use crate::db::job_repo::{self, ScanJobRow};
use crate::db::Database;
use crate::worker::job::{JobCounts, JobState, ScanJob};

/// One `scan_jobs` row per job; the record column holds the whole job as JSON.
#[derive(Clone)]
pub struct SqliteStatusStore {
    db: Database,
}

impl SqliteStatusStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    fn to_row(job: &ScanJob) -> Result<ScanJobRow, StoreError> {
        Ok(ScanJobRow {
            id: job.id.clone(),
            scan_id: job.scan_id.clone(),
            state: job.state.as_str().to_string(),
            stage: job.stage.label().to_string(),
            progress_percent: job.progress_percent,
            record: serde_json::to_string(job)?,
            created_at: job.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            updated_at: job.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }

    fn from_row(row: ScanJobRow) -> Result<ScanJob, StoreError> {
        serde_json::from_str(&row.record).map_err(|e| StoreError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })
    }

    fn stored_state(&self, id: &str) -> Result<JobState, StoreError> {
        let row = job_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        JobState::parse(&row.state).ok_or_else(|| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("unknown state '{}'", row.state),
        })
    }
}

impl StatusStore for SqliteStatusStore {
    fn insert(&self, job: &ScanJob) -> Result<(), StoreError> {
        let row = Self::to_row(job)?;
        job_repo::insert(&self.db, &row).map_err(|e| {
            if e.is_unique_violation() {
                StoreError::AlreadyExists(job.id.clone())
            } else {
                StoreError::Database(e)
            }
        })
    }

    fn get(&self, id: &str) -> Result<ScanJob, StoreError> {
        let row = job_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::from_row(row)
    }

    fn put_if_state(&self, job: &ScanJob, expected: JobState) -> Result<(), StoreError> {
        let row = Self::to_row(job)?;
        if job_repo::update_if_state(&self.db, &row, expected.as_str())? {
            return Ok(());
        }
        let actual = self.stored_state(&job.id)?;
        Err(StoreError::StateMismatch {
            id: job.id.clone(),
            expected,
            actual,
        })
    }

    fn list(&self) -> Result<Vec<ScanJob>, StoreError> {
        job_repo::list_all(&self.db)?
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    fn counts(&self) -> Result<JobCounts, StoreError> {
        let mut counts = JobCounts::default();
        for (state, n) in job_repo::count_by_state(&self.db)? {
            let parsed = JobState::parse(&state).ok_or_else(|| StoreError::Corrupt {
                id: format!("<state {}>", state),
                reason: format!("unknown state '{}'", state),
            })?;
            counts.add_many(parsed, usize::try_from(n).unwrap_or(usize::MAX));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use crate::worker::job::{JobStage, ScanMetadata};
    use std::path::PathBuf;

    #[test]
    fn test_insert_get() {
        contract::insert_get(&SqliteStatusStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_put_if_state() {
        contract::put_if_state(&SqliteStatusStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_list_and_counts() {
        contract::list_and_counts(&SqliteStatusStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_counts_by_state() {
        contract::counts_by_state(&SqliteStatusStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("jobs.db");

        let mut job = ScanJob::new("scan", ScanMetadata::default(), PathBuf::from("/uploads/scan"));
        {
            let store = SqliteStatusStore::open(&path).unwrap();
            store.insert(&job).unwrap();
            job.start();
            job.advance(JobStage::MatchingFeatures);
            store.put_if_state(&job, JobState::Queued).unwrap();
        }

        let reopened = SqliteStatusStore::open(&path).unwrap();
        let stored = reopened.get(&job.id).unwrap();
        assert_eq!(stored, job);
        assert_eq!(stored.progress_percent, 30);
    }
}
