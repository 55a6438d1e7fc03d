//! Session token claims decoding.
//!
//! Tokens are HS256 JWTs signed by the service. The client never holds the
//! signing key, so decoding here only reads the payload segment to derive
//! the identity view. Signature and expiry are the server's job: an expired
//! token still decodes and is rejected by the service with `token-expired`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Errors produced while decoding a token payload.
#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not a three-segment JWT")]
    Malformed,
    #[error("token payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not valid claims JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Payload claims issued by the membership service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default)]
    pub admin: bool,
    /// Expiry as a Unix timestamp in seconds.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Read-only identity projected from the current token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub admin: bool,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self { user_id: claims.user_id, admin: claims.admin }
    }
}

impl Claims {
    /// Whether the token has expired at `now` (Unix seconds). Tokens without
    /// an `exp` claim never expire locally.
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp.is_some_and(|exp| now >= exp)
    }
}

/// Decode the payload segment of `token` without verifying its signature.
///
/// # Errors
///
/// Returns [`ClaimsError`] if the token does not have three segments, the
/// payload is not base64url, or the JSON does not carry a `user_id`.
pub fn decode(token: &str) -> Result<Claims, ClaimsError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(ClaimsError::Malformed);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}


#[cfg(test)]
#[path = "claims_test.rs"]
mod tests;
