use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One issued bearer token and the client it was issued to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity: OffsetDateTime,
    pub is_active: bool,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: OffsetDateTime,
}

pub(crate) const SESSION_COLUMNS: &str = "id, user_id, token, device, browser, os, ip_address, \
     user_agent, last_activity, is_active, expires_at, created_at";
