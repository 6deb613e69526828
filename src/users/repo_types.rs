use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Capability level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, absent for Google-only accounts
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires: Option<OffsetDateTime>,
}

/// Partial update applied from the admin back-office.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub(crate) const USER_COLUMNS: &str = "id, name, email, password_hash, google_id, role, is_active, \
     is_verified, verification_token, verification_expires, reset_token, reset_expires, \
     created_at, updated_at";
