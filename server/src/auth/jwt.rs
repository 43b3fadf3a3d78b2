use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::Claims;
use crate::ws::UserId;

/// Resolve the JWT signing key: the configured secret if any, otherwise a
/// 256-bit random key stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(
    configured: Option<&str>,
    data_dir: &str,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Some(secret) = configured.filter(|s| !s.is_empty()) {
        tracing::info!("JWT signing key taken from configuration");
        return Ok(secret.as_bytes().to_vec());
    }

    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an HS256 access token for `user_id`, valid for `ttl_hours`.
pub fn issue_access_token(
    secret: &[u8],
    user_id: UserId,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id,
        iat: now,
        exp: now.saturating_add(ttl_hours.saturating_mul(3600)),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Decode a bearer credential, checking signature and expiry.
pub fn verify_credential(secret: &[u8], token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn issued_token_verifies() {
        let token = issue_access_token(SECRET, 42, 1).unwrap();
        let claims = verify_credential(SECRET, &token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_access_token(SECRET, 42, -2).unwrap();
        let err = verify_credential(SECRET, &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::ExpiredSignature);
    }

    #[test]
    fn extreme_lifetimes_saturate_instead_of_overflowing() {
        let token = issue_access_token(SECRET, 42, i64::MAX).unwrap();
        let claims = verify_credential(SECRET, &token).unwrap();
        assert_eq!(claims.exp, i64::MAX);

        let token = issue_access_token(SECRET, 42, i64::MIN).unwrap();
        assert!(verify_credential(SECRET, &token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_access_token(SECRET, 42, 1).unwrap();
        let err = verify_credential(b"other", &token).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::InvalidSignature);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_credential(SECRET, "not-a-jwt").is_err());
    }

    #[test]
    fn generated_secret_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();

        let first = load_or_generate_jwt_secret(None, data_dir).unwrap();
        let second = load_or_generate_jwt_secret(None, data_dir).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);

        let configured = load_or_generate_jwt_secret(Some("abc"), data_dir).unwrap();
        assert_eq!(configured, b"abc".to_vec());
    }
}
