//! Credential primitives: password hashing, device API keys, and the
//! HMAC-signed bearer tokens used by user-scoped endpoints.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password with a fresh random salt. The PHC string format embeds
/// salt and parameters, so verification needs no extra storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash string. Any parse failure of
/// the stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Device API keys
// ---------------------------------------------------------------------------

/// 32 random bytes, hex-encoded. Issued once at device registration and
/// immutable afterwards.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Bearer tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies compact signed tokens of the form
/// `"{user_id}.{expires_at_unix}.{hex(hmac_sha256)}"`.
#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>, ttl_mins: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::minutes(ttl_mins),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> IssuedToken {
        let expires_at = Utc::now() + self.ttl;
        let payload = format!("{}.{}", user_id, expires_at.timestamp());
        let token = format!("{payload}.{}", self.sign(&payload));
        IssuedToken { token, expires_at }
    }

    /// Validate signature first, then expiry, and return the embedded user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [user_part, exp_part, sig_part] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };

        let user_id = Uuid::parse_str(user_part).map_err(|_| TokenError::Malformed)?;
        let expires_at: i64 = exp_part.parse().map_err(|_| TokenError::Malformed)?;
        let sig = hex::decode(sig_part).map_err(|_| TokenError::Malformed)?;

        let payload = format!("{user_part}.{exp_part}");
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| TokenError::BadSignature)?;

        if expires_at <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(user_id)
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("unit-test-secret", 30)
    }

    #[test]
    fn issue_then_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let issued = signer().issue(user_id);
        assert_eq!(signer().verify(&issued.token).unwrap(), user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let expired = TokenSigner::new("unit-test-secret", -5);
        let issued = expired.issue(Uuid::new_v4());
        assert_eq!(
            signer().verify(&issued.token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let issued = signer().issue(Uuid::new_v4());
        let mut parts: Vec<String> =
            issued.token.split('.').map(str::to_owned).collect();
        parts[0] = Uuid::new_v4().to_string();
        let forged = parts.join(".");
        assert_eq!(
            signer().verify(&forged).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issued = signer().issue(Uuid::new_v4());
        let other = TokenSigner::new("another-secret", 30);
        assert_eq!(
            other.verify(&issued.token).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            signer().verify("not-a-token").unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(signer().verify("a.b.c").unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn api_keys_are_hex_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("hunter2hunter2", "not-a-phc-string"));
    }
}
