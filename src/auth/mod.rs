//! Account registration, password login and bearer sessions.

pub mod password;
pub mod throttle;
pub mod token;

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{Profile, Session, User};

pub use throttle::LoginThrottle;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 1024;
const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be between 8 and 1024 characters")]
    WeakPassword,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Session invalid")]
    SessionInvalid,
    #[error("Session expired")]
    SessionExpired,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A freshly issued session. `token` is only ever returned here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: User,
    pub expires_at: NaiveDateTime,
}

/// Trimmed, lowercased email, or `InvalidEmail`.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
            None => false,
        };
    if valid {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail)
    }
}

/// Create an account with an empty profile.
pub fn register(
    conn: &Connection,
    email: &str,
    password: &str,
    now: NaiveDateTime,
) -> Result<User, AuthError> {
    let email = normalize_email(email)?;
    let length = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(AuthError::WeakPassword);
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: password::hash_password(password),
        created_at: now,
    };

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    db::insert_user(&tx, &user).map_err(|e| match e {
        DatabaseError::Duplicate(_) => AuthError::EmailTaken,
        other => AuthError::Database(other),
    })?;
    db::upsert_profile(&tx, &Profile::empty(user.id, now))?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok(user)
}

/// Verify credentials and open a session valid for `ttl`.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    now: NaiveDateTime,
    ttl: Duration,
) -> Result<IssuedSession, AuthError> {
    let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;

    let Some(user) = db::get_user_by_email(conn, &email)? else {
        password::burn_verification(password);
        return Err(AuthError::InvalidCredentials);
    };
    if !password::verify_password(password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let token = token::generate_token();
    let expires_at = now + ttl;
    db::insert_session(
        conn,
        &Session {
            token_hash: token::hash_token(&token),
            user_id: user.id,
            created_at: now,
            expires_at,
        },
    )?;

    tracing::info!(user_id = %user.id, "Session opened");
    Ok(IssuedSession {
        token,
        user,
        expires_at,
    })
}

/// Close the session of `token`. Unknown tokens are not an error.
pub fn logout(conn: &Connection, token: &str) -> Result<(), AuthError> {
    if db::delete_session(conn, &token::hash_token(token))? {
        tracing::info!("Session closed");
    }
    Ok(())
}

/// Resolve a bearer token to its user. Expired sessions are deleted.
pub fn authenticate(conn: &Connection, token: &str, now: NaiveDateTime) -> Result<User, AuthError> {
    let token_hash = token::hash_token(token);
    let session = db::get_session(conn, &token_hash)?.ok_or(AuthError::SessionInvalid)?;

    if session.expires_at <= now {
        db::delete_session(conn, &token_hash)?;
        return Err(AuthError::SessionExpired);
    }

    db::get_user(conn, &session.user_id)?.ok_or(AuthError::SessionInvalid)
}
