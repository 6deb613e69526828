use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
            MessageResponse, PublicUser, RegisterRequest, ResetPasswordRequest,
        },
        extractors::{AuthSession, AuthUser, ClientMeta},
        jwt::{JwtKeys, TokenKind},
        middleware,
        password::{
            hash_password, is_valid_email, meets_policy, random_token, verify_password,
            MIN_PASSWORD_LEN,
        },
    },
    error::{AppError, AppResult},
    sessions::service::{deactivate_all_sessions, deactivate_session, start_session},
    state::AppState,
    users::{
        repo::DuplicateEmail,
        repo_types::{NewUser, User},
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/verify-email/:token", get(verify_email))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password/:token", post(reset_password))
}

pub fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route_layer(from_fn_with_state(state.clone(), middleware::protect))
}

pub fn session_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/password", put(change_password))
        .route("/users/logout", post(logout))
        .route_layer(from_fn_with_state(state.clone(), middleware::session))
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn check_password_policy(password: &str) -> AppResult<()> {
    if !meets_policy(password) {
        warn!("password too short");
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[instrument(skip(state, meta, payload))]
pub async fn register(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();

    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    check_password_policy(&payload.password)?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let verification_token = random_token(40);
    let user = state
        .users
        .create(NewUser {
            name,
            email,
            password_hash: Some(hash),
            google_id: None,
            is_verified: false,
            verification_token: Some(verification_token.clone()),
            verification_expires: Some(
                OffsetDateTime::now_utc()
                    + Duration::minutes(state.config.verification_token_ttl_minutes),
            ),
        })
        .await
        .map_err(|e| {
            if e.is::<DuplicateEmail>() {
                warn!("email registered concurrently");
                AppError::Conflict("Email already registered".into())
            } else {
                AppError::Internal(e)
            }
        })?;

    let link = format!(
        "{}/verify-email/{}",
        state.config.frontend_url, verification_token
    );
    if let Err(e) = state
        .mailer
        .send(
            &user.email,
            "Confirm your email",
            &format!("Hi {}, confirm your address here: {}", user.name, link),
        )
        .await
    {
        error!(error = ?e, user_id = %user.id, "verification mail failed");
    }

    let keys = JwtKeys::from_ref(&state);
    let (issued, _) = start_session(
        state.sessions.as_ref(),
        &keys,
        user.id,
        TokenKind::Registration,
        &meta,
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: issued.token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, meta, payload))]
pub async fn login(
    State(state): State<AppState>,
    meta: ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    let invalid = || AppError::Unauthorized;

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(invalid());
    };

    if !user.is_active {
        warn!(user_id = %user.id, "login on inactive account");
        return Err(invalid());
    }

    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "password login on account without password");
        return Err(invalid());
    };

    if !verify_password(&payload.password, hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let keys = JwtKeys::from_ref(&state);
    let (issued, _) = start_session(
        state.sessions.as_ref(),
        &keys,
        user.id,
        TokenKind::Login,
        &meta,
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token: issued.token,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AuthSession(current): AuthSession,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if let Some(hash) = user.password_hash.as_deref() {
        if !verify_password(&payload.current_password, hash)? {
            warn!(user_id = %user.id, "password change with wrong current password");
            return Err(AppError::BadRequest("Current password is incorrect".into()));
        }
    }
    check_password_policy(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    state.users.update_password(user.id, &hash).await?;
    let revoked =
        deactivate_all_sessions(state.sessions.as_ref(), user.id, Some(current.id)).await?;

    info!(user_id = %user.id, revoked, "password changed");
    Ok(Json(MessageResponse::new("Password updated")))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AuthSession(current): AuthSession,
) -> AppResult<Json<MessageResponse>> {
    deactivate_session(state.sessions.as_ref(), user.id, current.id).await?;
    info!(user_id = %user.id, session_id = %current.id, "user logged out");
    Ok(Json(MessageResponse::new("Logged out")))
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let user = state
        .users
        .find_by_verification_token(&token, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification link".into()))?;

    state.users.mark_verified(user.id).await?;
    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified")))
}

const FORGOT_PASSWORD_REPLY: &str = "If that address has an account, a reset link is on its way";

#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = normalize_email(&payload.email);

    match state.users.find_by_email(&email).await? {
        Some(user) if user.is_active => {
            let token = random_token(40);
            let expires = OffsetDateTime::now_utc()
                + Duration::minutes(state.config.reset_token_ttl_minutes);
            state.users.set_reset_token(user.id, &token, expires).await?;

            let link = format!("{}/reset-password/{}", state.config.frontend_url, token);
            if let Err(e) = state
                .mailer
                .send(
                    &user.email,
                    "Reset your password",
                    &format!("Use this link to choose a new password: {link}"),
                )
                .await
            {
                error!(error = ?e, user_id = %user.id, "reset mail failed");
            }
            info!(user_id = %user.id, "password reset requested");
        }
        _ => info!("password reset requested for unknown account"),
    }

    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_REPLY)))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    check_password_policy(&payload.password)?;

    let user = state
        .users
        .find_by_reset_token(&token, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset link".into()))?;

    let hash = hash_password(&payload.password)?;
    state.users.update_password(user.id, &hash).await?;
    let revoked = deactivate_all_sessions(state.sessions.as_ref(), user.id, None).await?;

    info!(user_id = %user.id, revoked, "password reset");
    Ok(Json(MessageResponse::new("Password has been reset")))
}
