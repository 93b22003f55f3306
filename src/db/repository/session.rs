use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::Session;

pub fn insert_session(conn: &Connection, session: &Session) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.token_hash,
            session.user_id.to_string(),
            format_datetime(&session.created_at),
            format_datetime(&session.expires_at),
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, token_hash: &str) -> Result<Option<Session>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(token_hash, user_id, created_at, expires_at)| {
        Ok(Session {
            token_hash,
            user_id: parse_uuid(&user_id)?,
            created_at: parse_datetime(&created_at)?,
            expires_at: parse_datetime(&expires_at)?,
        })
    })
    .transpose()
}

/// Returns whether a session was removed.
pub fn delete_session(conn: &Connection, token_hash: &str) -> Result<bool, DatabaseError> {
    let n = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
    Ok(n > 0)
}

pub fn purge_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> Result<usize, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![format_datetime(now)],
    )?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn session(user_id: uuid::Uuid, hash: &str, expires: &str) -> Session {
        Session {
            token_hash: hash.into(),
            user_id,
            created_at: datetime("2024-01-01 08:00:00"),
            expires_at: datetime(expires),
        }
    }

    #[test]
    fn session_insert_get_delete() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        insert_session(&conn, &session(user_id, "h1", "2024-02-01 08:00:00")).unwrap();

        let stored = get_session(&conn, "h1").unwrap().unwrap();
        assert_eq!(stored.user_id, user_id);
        assert!(delete_session(&conn, "h1").unwrap());
        assert!(!delete_session(&conn, "h1").unwrap());
        assert!(get_session(&conn, "h1").unwrap().is_none());
    }

    #[test]
    fn purge_removes_only_expired() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        insert_session(&conn, &session(user_id, "old", "2024-01-02 08:00:00")).unwrap();
        insert_session(&conn, &session(user_id, "new", "2024-03-01 08:00:00")).unwrap();

        let removed = purge_expired_sessions(&conn, &datetime("2024-02-01 00:00:00")).unwrap();
        assert_eq!(removed, 1);
        assert!(get_session(&conn, "old").unwrap().is_none());
        assert!(get_session(&conn, "new").unwrap().is_some());
    }
}
