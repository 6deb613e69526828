use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    repo_types::Session,
    service::{deactivate_all_sessions, deactivate_session, get_user_sessions},
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{AuthSession, AuthUser},
        middleware,
    },
    error::AppResult,
    state::AppState,
};

pub fn session_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/sessions", get(list_sessions).delete(revoke_all))
        .route("/users/sessions/:id", delete(revoke_one))
        .route_layer(from_fn_with_state(state.clone(), middleware::session))
}

/// One row of the "where you're signed in" list.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub ip_address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub current: bool,
}

impl SessionView {
    fn new(s: Session, current_id: Uuid) -> Self {
        Self {
            current: s.id == current_id,
            id: s.id,
            device: s.device,
            browser: s.browser,
            os: s.os,
            ip_address: s.ip_address,
            last_activity: s.last_activity,
            created_at: s.created_at,
            expires_at: s.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeAllResponse {
    pub message: String,
    pub count: u64,
}

#[instrument(skip_all)]
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AuthSession(current): AuthSession,
) -> AppResult<Json<Vec<SessionView>>> {
    let rows = get_user_sessions(state.sessions.as_ref(), user.id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|s| SessionView::new(s, current.id))
            .collect(),
    ))
}

#[instrument(skip(state, user))]
pub async fn revoke_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    deactivate_session(state.sessions.as_ref(), user.id, id).await?;
    Ok(Json(MessageResponse::new("Session revoked")))
}

/// Signs out everywhere except the device making the request.
#[instrument(skip_all)]
pub async fn revoke_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AuthSession(current): AuthSession,
) -> AppResult<Json<RevokeAllResponse>> {
    let count = deactivate_all_sessions(state.sessions.as_ref(), user.id, Some(current.id)).await?;
    Ok(Json(RevokeAllResponse {
        message: "Other sessions revoked".into(),
        count,
    }))
}
