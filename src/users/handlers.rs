use axum::{
    extract::{Path, Query, State},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{User, UserPatch};
use crate::{
    auth::{extractors::AuthUser, middleware},
    error::{AppError, AppResult},
    sessions::service::deactivate_all_sessions,
    state::AppState,
};

pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", patch(update_user))
        .route_layer(from_fn(middleware::admin))
        .route_layer(from_fn_with_state(state.clone(), middleware::protect))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<User>>> {
    let limit = p.limit.clamp(1, 100);
    let offset = p.offset.max(0);
    let users = state.users.list(limit, offset).await?;
    Ok(Json(users))
}

#[instrument(skip(state, admin))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UserPatch>,
) -> AppResult<Json<User>> {
    if body.role.is_none() && body.is_active.is_none() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }
    if id == admin.id {
        warn!(admin_id = %admin.id, "admin tried to modify own account");
        return Err(AppError::BadRequest(
            "Administrators cannot change their own role or status".into(),
        ));
    }

    let user = state
        .users
        .apply_patch(id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if body.is_active == Some(false) {
        deactivate_all_sessions(state.sessions.as_ref(), user.id, None).await?;
    }

    info!(admin_id = %admin.id, user_id = %user.id, role = ?user.role, active = user.is_active, "user updated");
    Ok(Json(user))
}
