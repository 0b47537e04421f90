//! Status table layout, versioned through SQLite's `user_version` pragma.

use rusqlite::{Connection, TransactionBehavior};

use super::error::DatabaseError;

/// Layout written by this build.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = include_str!("sql/schema_v1.sql");

/// Creates the tables in an empty database, accepts one already at
/// [`SCHEMA_VERSION`], and refuses a file written by a newer build.
pub fn ensure(conn: &mut Connection) -> Result<(), DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let found = user_version(&tx)?;

    match found {
        0 => {
            tx.execute_batch(SCHEMA_V1)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            log::info!("Created status schema v{}", SCHEMA_VERSION);
        }
        SCHEMA_VERSION => {}
        newer => {
            return Err(DatabaseError::UnsupportedSchema {
                found: newer,
                supported: SCHEMA_VERSION,
            })
        }
    }

    tx.commit()?;
    Ok(())
}

pub fn user_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(scan_jobs)").unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_current_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure(&mut conn).unwrap();

        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
        let columns = columns(&conn);
        for expected in ["id", "state", "stage", "progress_percent", "record"] {
            assert!(columns.iter().any(|c| c == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO scan_jobs VALUES ('j', 's', 'queued', 'queued', 0, '{}', 't', 't')",
            [],
        )
        .unwrap();
        ensure(&mut conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM scan_jobs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();

        let err = ensure(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::UnsupportedSchema { found, .. } if found == SCHEMA_VERSION + 1
        ));
    }
}
