use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// At least `MIN_PASSWORD_LEN` characters, counted as chars rather than bytes.
pub fn meets_policy(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

fn hasher() -> Argon2<'static> {
    Argon2::default()
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))
}

/// `Ok(false)` on a wrong password. Errors only when the stored hash is unreadable.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is not a PHC string");
        anyhow::anyhow!("argon2 parse: {e}")
    })?;
    Ok(hasher().verify_password(plain.as_bytes(), &parsed).is_ok())
}

/// Opaque single-use token for reset links, verification links and OAuth state.
pub fn random_token(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_counts_characters_not_bytes() {
        assert!(meets_policy("hunter22"));
        assert!(!meets_policy("hunter2"));
        // 8 chars, 10 bytes
        assert!(meets_policy("pässwört"));
        // 7 chars, 14 bytes
        assert!(!meets_policy("ééééééé"));
        assert!(!meets_policy(""));
    }

    #[test]
    fn hashes_are_salted_argon2id() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a).unwrap());
        assert!(verify_password("same-password", &b).unwrap());
        assert!(!verify_password("Same-password", &a).unwrap());
    }

    #[test]
    fn unreadable_stored_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("anything", "plaintext-from-an-old-import").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("jane@shop.example"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane doe@shop.example"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn random_tokens_are_alphanumeric_and_distinct() {
        let a = random_token(40);
        let b = random_token(40);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
