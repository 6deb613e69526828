use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewSession, Session, SESSION_COLUMNS};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session, or returns the active row already holding this token.
    async fn create(&self, new: NewSession) -> anyhow::Result<Session>;
    /// The live row for exactly this user and token, if any.
    async fn find_active(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Session>>;
    async fn touch(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()>;
    /// Returns false when no active row with that id belongs to the user.
    async fn deactivate(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
    async fn deactivate_all(&self, user_id: Uuid, except: Option<Uuid>) -> anyhow::Result<u64>;
    async fn list_active(&self, user_id: Uuid, now: OffsetDateTime)
        -> anyhow::Result<Vec<Session>>;
    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new: NewSession) -> anyhow::Result<Session> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (user_id, token, device, browser, os, ip_address,
                                  user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (token) WHERE is_active
            DO UPDATE SET last_activity = now()
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.token)
        .bind(&new.device)
        .bind(&new.browser)
        .bind(&new.os)
        .bind(&new.ip_address)
        .bind(&new.user_agent)
        .bind(new.expires_at)
        .fetch_one(&self.db)
        .await
        .context("insert session")?;
        Ok(session)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
              FROM sessions
             WHERE user_id = $1 AND token = $2 AND is_active AND expires_at > $3
            "#
        ))
        .bind(user_id)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find active session")?;
        Ok(session)
    }

    async fn touch(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query("UPDATE sessions SET last_activity = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.db)
            .await
            .context("touch session")?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE id = $1 AND user_id = $2 AND is_active",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.db)
        .await
        .context("deactivate session")?;
        Ok(res.rows_affected() > 0)
    }

    async fn deactivate_all(&self, user_id: Uuid, except: Option<Uuid>) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE sessions
               SET is_active = FALSE
             WHERE user_id = $1 AND is_active AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(except)
        .execute(&self.db)
        .await
        .context("deactivate all sessions")?;
        Ok(res.rows_affected())
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> anyhow::Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
              FROM sessions
             WHERE user_id = $1 AND is_active AND expires_at > $2
             ORDER BY last_activity DESC
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.db)
        .await
        .context("list active sessions")?;
        Ok(rows)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("delete expired sessions")?;
        Ok(res.rows_affected())
    }
}
