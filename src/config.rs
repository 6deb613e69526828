use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub login_ttl_minutes: i64,
    pub register_ttl_minutes: i64,
    pub renewal_ttl_minutes: i64,
    /// Tokens closer than this to `exp` are rotated by the session middleware.
    pub renewal_window_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub google: Option<GoogleConfig>,
    pub frontend_url: String,
    pub reset_token_ttl_minutes: i64,
    pub verification_token_ttl_minutes: i64,
    pub session_sweep_interval_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            login_ttl_minutes: env_or("JWT_LOGIN_TTL_MINUTES", 60 * 24),
            register_ttl_minutes: env_or("JWT_REGISTER_TTL_MINUTES", 60 * 24 * 30),
            renewal_ttl_minutes: env_or("JWT_RENEWAL_TTL_MINUTES", 60 * 24 * 7),
            renewal_window_minutes: env_or("JWT_RENEWAL_WINDOW_MINUTES", 60),
        };

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
            std::env::var("GOOGLE_REDIRECT_URL"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            google,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            reset_token_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 60),
            verification_token_ttl_minutes: env_or("VERIFICATION_TOKEN_TTL_MINUTES", 60 * 24),
            session_sweep_interval_secs: env_or("SESSION_SWEEP_INTERVAL_SECS", 300),
        })
    }
}
