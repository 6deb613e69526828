//! Route guards.
//!
//! `protect` trusts the JWT alone. `session` additionally requires a live
//! session row for the exact token and rolls the token over when it is
//! close to expiry. `admin` must sit behind one of the two.

use axum::{
    extract::{FromRef, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::{
    claims::Claims,
    extractors::{bearer_token, AuthSession, AuthUser, ClientMeta},
    jwt::JwtKeys,
};
use crate::{
    error::AppError,
    sessions::service::rotate_session,
    state::AppState,
    users::repo_types::User,
};

pub const NEW_TOKEN_HEADER: HeaderName = HeaderName::from_static("new-token");

/// Verifies the bearer token and loads its (active) owner.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, Claims, User), AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| {
            debug!("missing bearer token");
            AppError::Unauthorized
        })?
        .to_string();

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(&token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::Unauthorized
    })?;

    let user = match state.users.find_by_id(claims.user_id).await {
        Ok(Some(u)) if u.is_active => u,
        Ok(_) => {
            warn!(user_id = %claims.user_id, "token for missing or inactive user");
            return Err(AppError::Unauthorized);
        }
        Err(e) => {
            error!(error = ?e, user_id = %claims.user_id, "user lookup failed");
            return Err(AppError::Unauthorized);
        }
    };

    Ok((token, claims, user))
}

pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (_, _, user) = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

pub async fn session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (token, claims, user) = authenticate(&state, req.headers()).await?;
    let now = OffsetDateTime::now_utc();

    let current = match state.sessions.find_active(user.id, &token, now).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            warn!(user_id = %user.id, "no live session for token");
            return Err(AppError::Unauthorized);
        }
        Err(e) => {
            error!(error = ?e, user_id = %user.id, "session lookup failed");
            return Err(AppError::Unauthorized);
        }
    };

    if let Err(e) = state.sessions.touch(current.id, now).await {
        error!(error = ?e, session_id = %current.id, "session touch failed");
        return Err(AppError::Unauthorized);
    }

    let keys = JwtKeys::from_ref(&state);
    let mut renewed_token = None;
    let mut authoritative = current;
    if keys.needs_renewal(&claims, now) {
        let meta = ClientMeta::from_http(req.headers(), req.extensions());
        match rotate_session(state.sessions.as_ref(), &keys, &authoritative, &meta).await {
            Ok((issued, fresh)) => {
                info!(user_id = %user.id, "token renewed");
                renewed_token = Some(issued.token);
                authoritative = fresh;
            }
            Err(e) => {
                error!(error = ?e, user_id = %user.id, "token renewal failed");
                return Err(AppError::Unauthorized);
            }
        }
    }

    req.extensions_mut().insert(AuthUser(user));
    req.extensions_mut().insert(AuthSession(authoritative));

    let mut res = next.run(req).await;
    if let Some(token) = renewed_token {
        match HeaderValue::from_str(&token) {
            Ok(v) => {
                res.headers_mut().insert(NEW_TOKEN_HEADER, v);
            }
            Err(e) => error!(error = %e, "renewed token is not a valid header value"),
        }
    }
    Ok(res)
}

pub async fn admin(req: Request, next: Next) -> Result<Response, AppError> {
    let Some(AuthUser(user)) = req.extensions().get::<AuthUser>() else {
        return Err(AppError::Unauthorized);
    };
    if !user.is_admin() {
        warn!(user_id = %user.id, "admin route refused");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}
