//! HMAC-SHA256 request signing
//!
//! The platform signs each delivery with the extension's webhook secret:
//!
//! ```text
//! X-Kiket-Timestamp: 1717000000
//! X-Kiket-Signature: hex(HMAC-SHA256(secret, "1717000000.<raw body>"))
//! ```
//!
//! Verification must run over the exact raw bytes received, never a
//! re-serialized payload. The timestamp is signed as the header text it
//! arrived as; it is only parsed for the freshness check.

use chrono::Utc;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "x-kiket-signature";

/// Header carrying the unix timestamp (seconds) the signature covers
pub const TIMESTAMP_HEADER: &str = "x-kiket-timestamp";

/// Maximum accepted distance between the request timestamp and now, in either direction
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Verify a signed webhook against the current time.
///
/// # Errors
///
/// - [`AuthError::Config`] if `secret` is `None` or empty
/// - [`AuthError::MissingHeader`] if either signing header is absent
/// - [`AuthError::InvalidTimestamp`] if the timestamp is not an integer
/// - [`AuthError::StaleRequest`] if the timestamp is more than 300s away from now
/// - [`AuthError::InvalidSignature`] if the signature does not match
pub fn verify_signature(secret: Option<&str>, body: &[u8], headers: &HeaderMap) -> AuthResult<()> {
    verify_signature_at(secret, body, headers, Utc::now().timestamp())
}

/// Verify a signed webhook as if the current unix time were `now`.
///
/// # Errors
///
/// Same as [`verify_signature`].
pub fn verify_signature_at(
    secret: Option<&str>,
    body: &[u8],
    headers: &HeaderMap,
    now: i64,
) -> AuthResult<()> {
    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => return Err(AuthError::Config),
    };

    let signature = header_str(headers, SIGNATURE_HEADER)?;
    let raw_timestamp = header_str(headers, TIMESTAMP_HEADER)?;

    let timestamp: i64 = raw_timestamp
        .trim()
        .parse()
        .map_err(|_| AuthError::InvalidTimestamp(raw_timestamp.to_string()))?;

    let skew_secs = now.saturating_sub(timestamp).saturating_abs();
    if skew_secs > MAX_CLOCK_SKEW_SECS {
        debug!(timestamp, now, skew_secs, "Rejecting stale webhook");
        return Err(AuthError::StaleRequest { skew_secs });
    }

    let expected = compute_signature(secret, raw_timestamp, body);
    if !bool::from(signature.as_bytes().ct_eq(expected.as_bytes())) {
        debug!(timestamp, "Webhook signature mismatch");
        return Err(AuthError::InvalidSignature);
    }

    Ok(())
}

/// Produce `(signature, timestamp)` for a body, as the platform would.
///
/// Uses the current time when `timestamp` is `None`. This is the exact inverse
/// of [`verify_signature`], so it is also how tests and local tooling build
/// valid requests.
pub fn generate_signature(secret: &str, body: &[u8], timestamp: Option<i64>) -> (String, String) {
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp()).to_string();
    (compute_signature(secret, &timestamp, body), timestamp)
}

fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any size"));
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> AuthResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader(name))
}
