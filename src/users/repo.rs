use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserPatch, USER_COLUMNS};

/// `create` was refused because the email is already registered.
#[derive(Debug, thiserror::Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_google_id(&self, google_id: &str) -> anyhow::Result<Option<User>>;
    async fn create(&self, new: NewUser) -> anyhow::Result<User>;
    /// Attaches a Google identity to an existing account and marks its email verified.
    async fn link_google_id(&self, id: Uuid, google_id: &str) -> anyhow::Result<User>;
    /// Replaces the password hash and clears any pending reset token.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    async fn find_by_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<()>;
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>>;
    async fn apply_patch(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_google_id(&self, google_id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(&self.db)
        .await
        .context("find user by google id")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, google_id, is_verified,
                               verification_token, verification_expires)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.google_id)
        .bind(new.is_verified)
        .bind(&new.verification_token)
        .bind(new.verification_expires)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.constraint() == Some("users_email_key") => {
                anyhow::Error::new(DuplicateEmail)
            }
            other => anyhow::Error::new(other).context("insert user"),
        })?;
        Ok(user)
    }

    async fn link_google_id(&self, id: Uuid, google_id: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET google_id = $2, is_verified = TRUE, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(google_id)
        .fetch_one(&self.db)
        .await
        .context("link google id")?;
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, reset_token = NULL, reset_expires = NULL,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("update password")?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $2, reset_expires = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires)
        .execute(&self.db)
        .await
        .context("set reset token")?;
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1 AND reset_expires > $2"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find user by reset token")?;
        Ok(user)
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
             WHERE verification_token = $1 AND verification_expires > $2
            "#
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find user by verification token")?;
        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET is_verified = TRUE, verification_token = NULL,
                   verification_expires = NULL, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await
        .context("mark user verified")?;
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }

    async fn apply_patch(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET role = COALESCE($2, role),
                   is_active = COALESCE($3, is_active),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.role)
        .bind(patch.is_active)
        .fetch_optional(&self.db)
        .await
        .context("patch user")?;
        Ok(user)
    }
}
