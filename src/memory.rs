//! In-memory stores backing the router in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    mailer::Mailer,
    sessions::{
        repo::SessionStore,
        repo_types::{NewSession, Session},
    },
    users::{
        repo::{DuplicateEmail, UserStore},
        repo_types::{NewUser, Role, User, UserPatch},
    },
};

/// Store methods armed to return an error, by name.
#[derive(Default)]
struct FailPoints(std::sync::Mutex<HashSet<&'static str>>);

impl FailPoints {
    fn arm(&self, op: &'static str) {
        self.0.lock().unwrap().insert(op);
    }

    fn check(&self, op: &'static str) -> anyhow::Result<()> {
        if self.0.lock().unwrap().contains(op) {
            anyhow::bail!("{op}: connection reset by peer");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
    fail: FailPoints,
    stale_email_reads: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully-formed user, bypassing `create`.
    pub async fn insert(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }

    pub async fn remove(&self, id: Uuid) {
        self.users.lock().await.remove(&id);
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail.arm(op);
    }

    /// Makes `find_by_email` miss, like a read racing a concurrent insert.
    pub fn stale_email_reads(&self) {
        self.stale_email_reads.store(true, Ordering::SeqCst);
    }
}

pub fn user_fixture(name: &str, email: &str, password_hash: Option<String>, role: Role) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        name: name.into(),
        email: email.into(),
        password_hash,
        google_id: None,
        role,
        is_active: true,
        is_verified: false,
        verification_token: None,
        verification_expires: None,
        reset_token: None,
        reset_expires: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.fail.check("find_by_id")?;
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        if self.stale_email_reads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.lock().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(DuplicateEmail.into());
        }
        let mut user = user_fixture(&new.name, &new.email, new.password_hash, Role::User);
        user.google_id = new.google_id;
        user.is_verified = new.is_verified;
        user.verification_token = new.verification_token;
        user.verification_expires = new.verification_expires;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn link_google_id(&self, id: Uuid, google_id: &str) -> anyhow::Result<User> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no user {id}"))?;
        user.google_id = Some(google_id.into());
        user.is_verified = true;
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&id) {
            user.password_hash = Some(password_hash.into());
            user.reset_token = None;
            user.reset_expires = None;
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&id) {
            user.reset_token = Some(token.into());
            user.reset_expires = Some(expires);
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| {
                u.reset_token.as_deref() == Some(token)
                    && u.reset_expires.map_or(false, |e| e > now)
            })
            .cloned())
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| {
                u.verification_token.as_deref() == Some(token)
                    && u.verification_expires.map_or(false, |e| e > now)
            })
            .cloned())
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&id) {
            user.is_verified = true;
            user.verification_token = None;
            user.verification_expires = None;
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let users = self.users.lock().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn apply_patch(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().await;
        Ok(users.get_mut(&id).map(|user| {
            if let Some(role) = patch.role {
                user.role = role;
            }
            if let Some(active) = patch.is_active {
                user.is_active = active;
            }
            user.clone()
        }))
    }
}

fn is_live(s: &Session, now: OffsetDateTime) -> bool {
    s.is_active && s.expires_at > now
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    fail: FailPoints,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail.arm(op);
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn all_for(&self, user_id: Uuid) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, new: NewSession) -> anyhow::Result<Session> {
        self.fail.check("create")?;
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions
            .values_mut()
            .find(|s| s.is_active && s.token == new.token)
        {
            existing.last_activity = now;
            return Ok(existing.clone());
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            token: new.token,
            device: new.device,
            browser: new.browser,
            os: new.os,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            last_activity: now,
            is_active: true,
            expires_at: new.expires_at,
            created_at: now,
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Session>> {
        self.fail.check("find_active")?;
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|s| s.user_id == user_id && s.token == token && is_live(s, now))
            .cloned())
    }

    async fn touch(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<()> {
        self.fail.check("touch")?;
        if let Some(s) = self.sessions.lock().await.get_mut(&id) {
            s.last_activity = now;
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(s) if s.user_id == user_id && s.is_active => {
                s.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_all(&self, user_id: Uuid, except: Option<Uuid>) -> anyhow::Result<u64> {
        let mut count = 0;
        for s in self.sessions.lock().await.values_mut() {
            if s.user_id == user_id && s.is_active && Some(s.id) != except {
                s.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> anyhow::Result<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        let mut rows: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && is_live(s, now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rows)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((to.into(), subject.into(), body.into()));
        Ok(())
    }
}
