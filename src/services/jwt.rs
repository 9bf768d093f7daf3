//! Reads claims out of an access token without verifying it.
//!
//! The backend verifies signatures; the client only needs `exp` to decide
//! whether a stored token is worth presenting, and `sub` to check that a
//! token belongs to the user the server reports.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use crate::types::errors::BackendError;

/// Seconds before the real expiry at which a token is treated as expired.
pub const EXPIRY_LEEWAY_SECS: i64 = 30;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decodes the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<TokenClaims, BackendError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(BackendError::AuthFailed("malformed access token".to_string())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| BackendError::AuthFailed(format!("token payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| BackendError::AuthFailed(format!("token payload is not valid claims: {}", e)))
}

/// Returns the `exp` claim of `token`, if it decodes.
pub fn expiry_of(token: &str) -> Option<i64> {
    decode_claims(token).ok().and_then(|c| c.exp)
}

/// Rejects a token whose `sub` names someone other than `user_id`. Opaque
/// tokens that don't decode as a JWT are left to the server.
pub fn check_subject(token: &str, user_id: &str) -> Result<(), BackendError> {
    match decode_claims(token) {
        Ok(claims) if claims.sub != user_id => Err(BackendError::AuthFailed(format!(
            "token subject {} does not match user {}",
            claims.sub, user_id
        ))),
        _ => Ok(()),
    }
}

/// True if `expires_at` is within the leeway of `now` (both unix seconds).
pub fn is_expiring(expires_at: Option<i64>, now: i64) -> bool {
    matches!(expires_at, Some(exp) if exp - EXPIRY_LEEWAY_SECS <= now)
}
