use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{
    format_datetime, map_unique_violation, parse_datetime, parse_opt_date, parse_uuid,
};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            format_datetime(&user.created_at),
        ],
    )
    .map_err(|e| map_unique_violation(e, "email already registered"))?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
            params![id.to_string()],
            user_row_from_rusqlite,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?1",
            params![email],
            user_row_from_rusqlite,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn get_profile(conn: &Connection, user_id: &Uuid) -> Result<Option<Profile>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT user_id, full_name, date_of_birth, sex, notes, updated_at
             FROM profiles WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(ProfileRow {
                    user_id: row.get(0)?,
                    full_name: row.get(1)?,
                    date_of_birth: row.get(2)?,
                    sex: row.get(3)?,
                    notes: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.map(|r| {
        Ok(Profile {
            user_id: parse_uuid(&r.user_id)?,
            full_name: r.full_name,
            date_of_birth: parse_opt_date(r.date_of_birth)?,
            sex: r.sex,
            notes: r.notes,
            updated_at: parse_datetime(&r.updated_at)?,
        })
    })
    .transpose()
}

/// Insert or replace the profile of `profile.user_id`.
pub fn upsert_profile(conn: &Connection, profile: &Profile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO profiles (user_id, full_name, date_of_birth, sex, notes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            full_name = excluded.full_name,
            date_of_birth = excluded.date_of_birth,
            sex = excluded.sex,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![
            profile.user_id.to_string(),
            profile.full_name,
            profile.date_of_birth.map(|d| d.to_string()),
            profile.sex,
            profile.notes,
            format_datetime(&profile.updated_at),
        ],
    )?;
    Ok(())
}

struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    created_at: String,
}

fn user_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        email: row.email,
        password_hash: row.password_hash,
        created_at: parse_datetime(&row.created_at)?,
    })
}

struct ProfileRow {
    user_id: String,
    full_name: Option<String>,
    date_of_birth: Option<String>,
    sex: Option<String>,
    notes: Option<String>,
    updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn user_lookup_by_email() {
        let conn = crate::db::open_memory_database().unwrap();
        let id = make_user(&conn, "ana@example.com");

        let by_email = get_user_by_email(&conn, "ana@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(get_user(&conn, &id).unwrap().unwrap().email, "ana@example.com");
        assert!(get_user_by_email(&conn, "bob@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_duplicate_error() {
        let conn = crate::db::open_memory_database().unwrap();
        make_user(&conn, "ana@example.com");
        let again = insert_user(
            &conn,
            &User {
                id: Uuid::new_v4(),
                email: "ana@example.com".into(),
                password_hash: "y".into(),
                created_at: datetime("2024-01-02 08:00:00"),
            },
        );
        assert!(matches!(again, Err(DatabaseError::Duplicate(_))));
    }

    #[test]
    fn profile_upsert_overwrites() {
        let conn = crate::db::open_memory_database().unwrap();
        let user_id = make_user(&conn, "ana@example.com");
        assert!(get_profile(&conn, &user_id).unwrap().is_none());

        let mut profile = Profile::empty(user_id, datetime("2024-01-01 08:00:00"));
        upsert_profile(&conn, &profile).unwrap();

        profile.full_name = Some("Ana Lima".into());
        profile.date_of_birth = Some(date("1980-05-17"));
        upsert_profile(&conn, &profile).unwrap();

        let stored = get_profile(&conn, &user_id).unwrap().unwrap();
        assert_eq!(stored.full_name.as_deref(), Some("Ana Lima"));
        assert_eq!(stored.date_of_birth, Some(date("1980-05-17")));
    }
}
