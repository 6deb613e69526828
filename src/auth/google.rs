//! Google sign-in: consent redirect, code exchange and account resolution.

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        extractors::ClientMeta,
        jwt::{JwtKeys, TokenKind},
        password::random_token,
    },
    config::GoogleConfig,
    error::AppError,
    sessions::service::start_session,
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const STATE_COOKIE: &str = "oauth_state";

/// Profile fields returned by Google's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub verified_email: bool,
}

#[async_trait]
pub trait GoogleIdentity: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> anyhow::Result<GoogleProfile>;
}

pub struct GoogleClient {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl GoogleIdentity for GoogleClient {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<GoogleProfile> {
        let res = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("google token exchange")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("google token exchange failed: {status} {body}");
        }
        let tokens: TokenResponse = res.json().await.context("google token response")?;

        let profile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .context("google userinfo")?
            .error_for_status()
            .context("google userinfo status")?
            .json::<GoogleProfile>()
            .await
            .context("google userinfo body")?;
        Ok(profile)
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("google profile has no email address")]
    MissingEmail,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("google has not verified this email address")]
    UnverifiedEmail,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Finds the account for a Google profile: by Google id, then by email
/// (linking it), else creates a new password-less account.
pub async fn resolve_google_user(
    users: &dyn UserStore,
    profile: &GoogleProfile,
) -> Result<User, OAuthError> {
    if let Some(user) = users.find_by_google_id(&profile.id).await? {
        return if user.is_active {
            Ok(user)
        } else {
            Err(OAuthError::AccountDisabled)
        };
    }

    let email = profile
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(OAuthError::MissingEmail)?;

    if let Some(existing) = users.find_by_email(&email).await? {
        if !existing.is_active {
            return Err(OAuthError::AccountDisabled);
        }
        if !profile.verified_email {
            return Err(OAuthError::UnverifiedEmail);
        }
        let linked = users.link_google_id(existing.id, &profile.id).await?;
        info!(user_id = %linked.id, "google identity linked to existing account");
        return Ok(linked);
    }

    let name = profile
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or("Customer").to_string());
    let user = users
        .create(NewUser {
            name,
            email,
            password_hash: None,
            google_id: Some(profile.id.clone()),
            is_verified: true,
            verification_token: None,
            verification_expires: None,
        })
        .await?;
    info!(user_id = %user.id, "account created from google profile");
    Ok(user)
}

pub fn google_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

fn not_configured() -> AppError {
    AppError::NotFound("Google sign-in is not configured".into())
}

fn state_cookie(value: &str, max_age: u32) -> String {
    format!("{STATE_COOKIE}={value}; Path=/api/auth/google; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

fn read_state_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == STATE_COOKIE)
        .map(|(_, v)| v.to_string())
}

#[instrument(skip(state))]
pub async fn google_start(State(state): State<AppState>) -> Result<Response, AppError> {
    let google = state.google.clone().ok_or_else(not_configured)?;
    let csrf = random_token(32);
    let url = google.authorize_url(&csrf);
    Ok((
        [(header::SET_COOKIE, state_cookie(&csrf, 600))],
        Redirect::to(&url),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[instrument(skip(state, meta, headers, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    meta: ClientMeta,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let google = state.google.clone().ok_or_else(not_configured)?;
    let frontend = state.config.frontend_url.trim_end_matches('/').to_string();
    let failure = || {
        (
            [(header::SET_COOKIE, state_cookie("", 0))],
            Redirect::to(&format!("{frontend}/login?error=oauth_failed")),
        )
            .into_response()
    };

    if let Some(err) = params.error.as_deref() {
        warn!(error = %err, "google returned an error");
        return Ok(failure());
    }

    let expected = read_state_cookie(&headers);
    let (Some(code), Some(got), Some(expected)) = (params.code.as_deref(), params.state.as_deref(), expected) else {
        warn!("google callback without code or state");
        return Ok(failure());
    };
    if got != expected {
        warn!("google callback state mismatch");
        return Ok(failure());
    }

    let profile = match google.exchange_code(code).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = ?e, "google code exchange failed");
            return Ok(failure());
        }
    };

    let user = match resolve_google_user(state.users.as_ref(), &profile).await {
        Ok(u) => u,
        Err(OAuthError::Store(e)) => {
            error!(error = ?e, "google account resolution failed");
            return Ok(failure());
        }
        Err(e) => {
            warn!(reason = %e, google_id = %profile.id, "google sign-in refused");
            return Ok(failure());
        }
    };

    let keys = JwtKeys::from_ref(&state);
    let (issued, _) = start_session(
        state.sessions.as_ref(),
        &keys,
        user.id,
        TokenKind::Registration,
        &meta,
    )
    .await?;

    info!(user_id = %user.id, "google sign-in");
    Ok((
        [(header::SET_COOKIE, state_cookie("", 0))],
        Redirect::to(&format!(
            "{frontend}/oauth/success?token={}",
            urlencoding::encode(&issued.token)
        )),
    )
        .into_response())
}
