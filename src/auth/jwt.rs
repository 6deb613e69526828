use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Which call site a token is minted for; each has its own lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Login,
    Registration,
    Renewal,
}

/// A signed token together with the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub login_ttl: Duration,
    pub registration_ttl: Duration,
    pub renewal_ttl: Duration,
    pub renewal_window: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            login_ttl_minutes,
            register_ttl_minutes,
            renewal_ttl_minutes,
            renewal_window_minutes,
        } = cfg;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            login_ttl: Duration::minutes(*login_ttl_minutes),
            registration_ttl: Duration::minutes(*register_ttl_minutes),
            renewal_ttl: Duration::minutes(*renewal_ttl_minutes),
            renewal_window: Duration::minutes(*renewal_window_minutes),
        }
    }

    pub fn ttl_for(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Login => self.login_ttl,
            TokenKind::Registration => self.registration_ttl,
            TokenKind::Renewal => self.renewal_ttl,
        }
    }

    /// Signs an HS256 token for `user_id` valid for `ttl` from now.
    pub fn sign_for(&self, user_id: Uuid, ttl: Duration) -> anyhow::Result<IssuedToken> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + ttl;
        let claims = Claims {
            user_id,
            iat: now.unix_timestamp().max(0) as usize,
            exp: expires_at.unix_timestamp().max(0) as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, exp = claims.exp, "jwt signed");
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
        })
    }

    pub fn sign(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<IssuedToken> {
        self.sign_for(user_id, self.ttl_for(kind))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }

    /// True once the token is inside the rolling-renewal window.
    pub fn needs_renewal(&self, claims: &Claims, now: OffsetDateTime) -> bool {
        claims.expires_at() - now < self.renewal_window
    }
}
