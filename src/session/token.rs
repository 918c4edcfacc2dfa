//! Bearer token expiry inspection
//!
//! The service issues compact signed tokens whose middle segment is a
//! base64url JSON claim set carrying `exp`. The client reads that claim
//! without verifying the signature; verification is the server's job, the
//! client only needs to know when to refresh.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

/// Extract the `exp` claim (seconds since epoch) from a token.
///
/// Returns None for anything that does not parse; callers treat an
/// unreadable token as expired.
pub fn expires_at(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("exp")?.as_u64()
}

/// Whether a token's `exp` claim is in the past (or unreadable)
pub fn is_expired(token: &str) -> bool {
    match expires_at(token) {
        Some(exp) => exp <= now_secs(),
        None => true,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
