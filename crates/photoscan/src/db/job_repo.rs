//! Queries over the `scan_jobs` table.
//!
//! Rows carry the full job record as JSON plus the columns needed for
//! filtering and the compare-and-set update.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct ScanJobRow {
    pub id: String,
    pub scan_id: String,
    pub state: String,
    pub stage: String,
    pub progress_percent: u8,
    pub record: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ScanJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            scan_id: row.get("scan_id")?,
            state: row.get("state")?,
            stage: row.get("stage")?,
            progress_percent: row.get("progress_percent")?,
            record: row.get("record")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(db: &Database, job: &ScanJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scan_jobs (id, scan_id, state, stage, progress_percent, record,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id,
                job.scan_id,
                job.state,
                job.stage,
                job.progress_percent,
                job.record,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites the row only while its stored state equals `expected_state`.
/// Returns whether a row was updated.
pub fn update_if_state(
    db: &Database,
    job: &ScanJobRow,
    expected_state: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scan_jobs SET state=?2, stage=?3, progress_percent=?4, record=?5,
             updated_at=?6
             WHERE id=?1 AND state=?7",
            params![
                job.id,
                job.state,
                job.stage,
                job.progress_percent,
                job.record,
                job.updated_at,
                expected_state,
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ScanJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scan_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ScanJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All rows, newest first.
pub fn list_all(db: &Database) -> Result<Vec<ScanJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM scan_jobs ORDER BY created_at DESC, id ASC")?;
        let rows = stmt
            .query_map([], ScanJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Row count per stored state value. States with no rows are absent.
pub fn count_by_state(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM scan_jobs GROUP BY state")?;
        let counts = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_row(id: &str) -> ScanJobRow {
        ScanJobRow {
            id: id.to_string(),
            scan_id: "scan".to_string(),
            state: "queued".to_string(),
            stage: "queued".to_string(),
            progress_percent: 0,
            record: "{}".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_row("job-1")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found.scan_id, "scan");
        assert_eq!(found.state, "queued");
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let db = test_db();
        insert(&db, &sample_row("dup")).unwrap();
        assert!(insert(&db, &sample_row("dup")).is_err());
    }

    #[test]
    fn test_update_if_state() {
        let db = test_db();
        let mut row = sample_row("cas");
        insert(&db, &row).unwrap();

        row.state = "running".to_string();
        row.progress_percent = 10;
        assert!(update_if_state(&db, &row, "queued").unwrap());

        row.state = "failed".to_string();
        assert!(!update_if_state(&db, &row, "queued").unwrap());

        let found = find_by_id(&db, "cas").unwrap().unwrap();
        assert_eq!(found.state, "running");
        assert_eq!(found.progress_percent, 10);
    }

    #[test]
    fn test_list_newest_first_and_counts() {
        let db = test_db();
        for i in 0..3 {
            let mut row = sample_row(&format!("l{}", i));
            row.created_at = format!("2026-01-0{}T00:00:00Z", i + 1);
            if i == 2 {
                row.state = "failed".to_string();
            }
            insert(&db, &row).unwrap();
        }

        let ids: Vec<String> = list_all(&db).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["l2", "l1", "l0"]);
        let mut counts = count_by_state(&db).unwrap();
        counts.sort();
        assert_eq!(
            counts,
            vec![("failed".to_string(), 1), ("queued".to_string(), 2)]
        );
    }
}
