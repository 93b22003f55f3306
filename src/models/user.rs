use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// Personal details attached 1:1 to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub notes: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    pub fn empty(user_id: Uuid, now: NaiveDateTime) -> Self {
        Self {
            user_id,
            full_name: None,
            date_of_birth: None,
            sex: None,
            notes: None,
            updated_at: now,
        }
    }
}

/// Bearer session. Only the SHA-256 hash of the token is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
