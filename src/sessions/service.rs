use std::{sync::Arc, time::Duration};

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::repo::SessionStore;
use super::repo_types::{NewSession, Session};
use crate::auth::{
    extractors::ClientMeta,
    jwt::{IssuedToken, JwtKeys, TokenKind},
    user_agent,
};
use crate::error::{AppError, AppResult};

fn new_session_row(user_id: Uuid, issued: &IssuedToken, meta: &ClientMeta) -> NewSession {
    let info = user_agent::parse(meta.user_agent.as_deref());
    NewSession {
        user_id,
        token: issued.token.clone(),
        device: info.device,
        browser: info.browser,
        os: info.os,
        ip_address: meta.ip.clone(),
        user_agent: meta.user_agent.clone(),
        expires_at: issued.expires_at,
    }
}

/// Mints a token of the given kind and records the session it authorises.
#[instrument(skip(store, keys, meta))]
pub async fn start_session(
    store: &dyn SessionStore,
    keys: &JwtKeys,
    user_id: Uuid,
    kind: TokenKind,
    meta: &ClientMeta,
) -> anyhow::Result<(IssuedToken, Session)> {
    let issued = keys.sign(user_id, kind).context("sign session token")?;
    let session = store
        .create(new_session_row(user_id, &issued, meta))
        .await?;
    info!(%user_id, session_id = %session.id, device = %session.device, "session started");
    Ok((issued, session))
}

/// Replaces `old` with a fresh renewal-length session and deactivates it.
///
/// Not transactional: two requests racing on the same old token may both
/// mint a replacement. Each replacement is a valid session of its own.
#[instrument(skip(store, keys, old, meta), fields(old_session = %old.id))]
pub async fn rotate_session(
    store: &dyn SessionStore,
    keys: &JwtKeys,
    old: &Session,
    meta: &ClientMeta,
) -> anyhow::Result<(IssuedToken, Session)> {
    let (issued, session) =
        start_session(store, keys, old.user_id, TokenKind::Renewal, meta).await?;
    store.deactivate(old.id, old.user_id).await?;
    info!(user_id = %old.user_id, new_session = %session.id, "session rotated");
    Ok((issued, session))
}

pub async fn get_user_sessions(store: &dyn SessionStore, user_id: Uuid) -> AppResult<Vec<Session>> {
    Ok(store.list_active(user_id, OffsetDateTime::now_utc()).await?)
}

pub async fn deactivate_session(
    store: &dyn SessionStore,
    user_id: Uuid,
    session_id: Uuid,
) -> AppResult<()> {
    if store.deactivate(session_id, user_id).await? {
        info!(%user_id, %session_id, "session deactivated");
        Ok(())
    } else {
        Err(AppError::NotFound("Session not found".into()))
    }
}

pub async fn deactivate_all_sessions(
    store: &dyn SessionStore,
    user_id: Uuid,
    except: Option<Uuid>,
) -> AppResult<u64> {
    let count = store.deactivate_all(user_id, except).await?;
    info!(%user_id, count, kept = ?except, "sessions deactivated");
    Ok(count)
}

/// Periodically deletes sessions whose `expires_at` has passed.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.delete_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => debug!("no expired sessions"),
                Ok(n) => info!(deleted = n, "expired sessions removed"),
                Err(e) => error!(error = ?e, "session sweep failed"),
            }
        }
    })
}
