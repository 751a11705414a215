// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth `state` parameter codec.
//!
//! The state carries the connecting user's id through Google's consent
//! screen. Format: `base64url(json) "." hex(hmac_sha256(key, base64url(json)))`
//! where the JSON is `{"userId": ..., "iat": <unix millis>}`. The payload is
//! visible to the browser, so it must never hold secrets.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a consent round trip may take before the state is refused.
pub const STATE_MAX_AGE_SECS: i64 = 10 * 60;

/// Allowed clock drift for states issued "in the future".
const CLOCK_SKEW_MILLIS: i64 = 60 * 1000;

/// Decoded state payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    pub user_id: String,
    /// Issue time, milliseconds since the Unix epoch
    pub iat: i64,
}

/// Wire shape accepted on decode; fields are checked explicitly.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    user_id: Option<String>,
    iat: Option<i64>,
}

/// Why a state was refused. All variants surface as `InvalidState`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("state is not a signed payload")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state payload is not valid JSON")]
    InvalidJson,
    #[error("state payload has no userId")]
    MissingUserId,
    #[error("state has expired")]
    Expired,
}

impl From<StateError> for AppError {
    fn from(_: StateError) -> Self {
        AppError::InvalidState
    }
}

/// Encode a signed state for `user_id`, stamped with the current time.
pub fn encode_state(user_id: &str, key: &[u8]) -> Result<String, AppError> {
    encode_state_at(user_id, key, Utc::now())
}

/// Encode a signed state for `user_id` as if issued at `now`.
pub fn encode_state_at(user_id: &str, key: &[u8], now: DateTime<Utc>) -> Result<String, AppError> {
    let state = OAuthState {
        user_id: user_id.to_string(),
        iat: now.timestamp_millis(),
    };
    let json = serde_json::to_vec(&state)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("State serialization failed: {}", e)))?;

    sign_payload(&URL_SAFE_NO_PAD.encode(json), key)
}

/// Sign an already-encoded payload segment.
pub fn sign_payload(payload: &str, key: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{}.{}", payload, hex::encode(signature)))
}

/// Verify and decode a state received on the callback.
pub fn decode_state(state: &str, key: &[u8]) -> Result<OAuthState, StateError> {
    decode_state_at(state, key, Utc::now())
}

/// Verify and decode a state as of `now`.
pub fn decode_state_at(
    state: &str,
    key: &[u8],
    now: DateTime<Utc>,
) -> Result<OAuthState, StateError> {
    let (payload, signature_hex) = state.split_once('.').ok_or(StateError::Malformed)?;
    let signature = hex::decode(signature_hex).map_err(|_| StateError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| StateError::BadSignature)?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| StateError::BadSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| StateError::Malformed)?;
    let raw: RawState = serde_json::from_slice(&json).map_err(|_| StateError::InvalidJson)?;

    let user_id = raw
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or(StateError::MissingUserId)?;
    let iat = raw.iat.ok_or(StateError::Malformed)?;

    let now_millis = now.timestamp_millis();
    let max_age = Duration::seconds(STATE_MAX_AGE_SECS).num_milliseconds();
    if iat > now_millis + CLOCK_SKEW_MILLIS || now_millis - iat > max_age {
        return Err(StateError::Expired);
    }

    Ok(OAuthState { user_id, iat })
}
