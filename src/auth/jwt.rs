//! JWT issuance and validation.
//!
//! Both access and refresh tokens are HS256 JWTs carrying a `token_type`
//! claim, so a refresh token can never be replayed where an access token
//! is expected. Validation is stateless and safe to call from any number
//! of concurrent handshakes.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access token lifetime: 15 minutes.
const ACCESS_TOKEN_TTL_SECS: i64 = 900;
/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Why a presented credential was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Token could not be decoded or its signature does not verify.
    #[error("token is malformed")]
    Malformed,
    /// Token is past its expiry claim.
    #[error("token has expired")]
    Expired,
    /// Token decoded fine but its declared purpose does not match
    /// the call site (e.g. refresh token presented as access token).
    #[error("wrong token type")]
    WrongType,
}

/// JWT claims for both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (UUIDv4)
    pub sub: String,
    /// "access" or "refresh"
    pub token_type: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file, regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, &key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Sign a token of the given type with a relative expiry.
/// Exposed so tests can mint already-expired tokens.
pub fn issue_token(
    secret: &[u8],
    user_id: &str,
    token_type: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        token_type: token_type.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Issue an access token (15-minute expiry).
pub fn issue_access_token(
    secret: &[u8],
    user_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(secret, user_id, TOKEN_TYPE_ACCESS, ACCESS_TOKEN_TTL_SECS)
}

/// Issue a refresh token (30-day expiry).
pub fn issue_refresh_token(
    secret: &[u8],
    user_id: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(secret, user_id, TOKEN_TYPE_REFRESH, REFRESH_TOKEN_TTL_SECS)
}

/// Decode and verify a token, then check its declared purpose.
/// The purpose check runs only after signature and expiry pass, so an
/// expired refresh token reports Expired, not WrongType.
pub fn validate_token(secret: &[u8], token: &str, expected_type: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Malformed,
        })?;

    if token_data.claims.token_type != expected_type {
        return Err(AuthError::WrongType);
    }

    Ok(token_data.claims)
}

/// Validate an access token and return its claims.
pub fn validate_access_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    validate_token(secret, token, TOKEN_TYPE_ACCESS)
}

/// Validate a refresh token and return its claims.
pub fn validate_refresh_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    validate_token(secret, token, TOKEN_TYPE_REFRESH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn access_token_round_trip() {
        let token = issue_access_token(SECRET, "user-1").unwrap();
        let claims = validate_access_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS);
    }

    #[test]
    fn garbage_token_is_malformed() {
        let err = validate_access_token(SECRET, "not-a-jwt").unwrap_err();
        assert_eq!(err, AuthError::Malformed);
    }

    #[test]
    fn token_signed_with_other_key_is_malformed() {
        let token = issue_access_token(b"another-secret-another-secret!!!", "user-1").unwrap();
        let err = validate_access_token(SECRET, &token).unwrap_err();
        assert_eq!(err, AuthError::Malformed);
    }

    #[test]
    fn expired_token_is_expired() {
        let token = issue_token(SECRET, "user-1", TOKEN_TYPE_ACCESS, -120).unwrap();
        let err = validate_access_token(SECRET, &token).unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[test]
    fn refresh_token_rejected_where_access_expected() {
        let token = issue_refresh_token(SECRET, "user-1").unwrap();
        let err = validate_access_token(SECRET, &token).unwrap_err();
        assert_eq!(err, AuthError::WrongType);
    }

    #[test]
    fn access_token_rejected_where_refresh_expected() {
        let token = issue_access_token(SECRET, "user-1").unwrap();
        let err = validate_refresh_token(SECRET, &token).unwrap_err();
        assert_eq!(err, AuthError::WrongType);
    }
}
