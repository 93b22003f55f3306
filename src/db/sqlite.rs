use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Schema migrations in order. Each script records its own version in
/// `schema_version`.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../resources/migrations/001_initial.sql")),
    (2, include_str!("../../resources/migrations/002_reference_data.sql")),
];

/// Apply every migration newer than the stored schema version, each in
/// its own transaction.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn);

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        tracing::info!(version, "Applying schema migration");
        let failed = |e: rusqlite::Error| DatabaseError::MigrationFailed {
            version,
            reason: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}

/// Highest applied migration, 0 on a fresh database.
fn schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
#[cfg(test)]
pub(crate) fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 11 entity tables + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn reference_data_seeded() {
        let conn = open_memory_database().unwrap();
        let biomarkers: i64 = conn
            .query_row("SELECT COUNT(*) FROM biomarkers", [], |row| row.get(0))
            .unwrap();
        let drugs: i64 = conn
            .query_row("SELECT COUNT(*) FROM drugs", [], |row| row.get(0))
            .unwrap();
        assert!(biomarkers >= 18);
        assert!(drugs >= 15);
    }

    #[test]
    fn file_database_reopens_without_remigrating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        drop(open_database(&path).unwrap());
        let conn = open_database(&path).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 2);
    }
}
