//! Session credential inspection without signature verification.
//!
//! The credential is a compact three-part `header.payload.signature` string
//! whose payload segment is base64url-encoded JSON. Only the claims are read
//! here, primarily `exp`, so the client can detect an expired session without
//! a network round trip. Cryptographic validity is the backend's job: the
//! gateway re-resolves every bearer credential with the backend, and nothing
//! in this module must ever be treated as proof of identity.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Claims read from the credential payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiration time (Unix timestamp). Absent means the credential is
    /// treated as expired.
    #[serde(default)]
    pub exp: Option<u64>,
    /// Remaining claims, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Errors that can occur while decoding a credential payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("credential has no payload segment")]
    MissingPayload,
    #[error("credential payload is not valid base64")]
    Base64,
    #[error("credential payload is not valid JSON")]
    Json,
}

/// Decode the payload segment of a credential into its claims.
///
/// Only requires a parseable middle segment; the segment count is not
/// enforced here (that is `validate_at`'s concern).
pub fn decode(credential: &str) -> Result<Claims, DecodeError> {
    let payload = credential
        .split('.')
        .nth(1)
        .ok_or(DecodeError::MissingPayload)?;
    // Tolerate padded input from backends that emit standard base64url.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| DecodeError::Base64)?;
    serde_json::from_slice(&bytes).map_err(|_| DecodeError::Json)
}

/// Whether the credential is expired at `now` (Unix seconds).
///
/// Fail-closed: a credential that cannot be decoded, or that carries no
/// `exp` claim, is expired.
pub fn expired_at(credential: &str, now: u64) -> bool {
    match decode(credential) {
        Ok(claims) => claims.exp.is_none_or(|exp| exp <= now),
        Err(_) => true,
    }
}

/// Whether the credential is structurally sound (exactly three segments)
/// and unexpired at `now`.
pub fn validate_at(credential: &str, now: u64) -> bool {
    credential.split('.').count() == 3 && !expired_at(credential, now)
}

/// `expired_at` against the system clock.
pub fn expired(credential: &str) -> bool {
    expired_at(credential, unix_now())
}

/// `validate_at` against the system clock.
pub fn validate(credential: &str) -> bool {
    validate_at(credential, unix_now())
}

/// Current Unix time in seconds. A clock before the epoch yields 0, which
/// makes every credential read as expired rather than valid.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
