//! Runtime token verification
//!
//! Verification order matters: the header algorithm is checked before any key
//! lookup, so a token claiming `HS256` (or anything other than ES256) is
//! rejected without ever touching the key set, regardless of its signature.
//! The raw `alg` string is read first, so values `jsonwebtoken` cannot
//! represent (`none`, `ES512`, made-up names) are still reported as an
//! unsupported algorithm.
//!
//! Validation rules:
//! - algorithm must be ES256
//! - `kid` must name a `use=sig`, `alg=ES256` key in the platform JWKS
//! - that key must be EC over P-256
//! - `iss` must equal [`TRUSTED_ISSUER`]
//! - `exp` must be strictly in the future (no clock-skew leeway)

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::jwks::{Jwk, JwkSet, JwksCache};
use super::{JwtClaims, TRUSTED_ISSUER};
use crate::error::{AuthError, AuthResult};

const REQUIRED_ALG: &str = "ES256";
const REQUIRED_CURVE: &str = "P-256";

/// Pull `authentication.runtime_token` out of a webhook payload.
///
/// An empty string is treated the same as a missing token.
pub fn extract_runtime_token(payload: &Value) -> Option<&str> {
    payload
        .get("authentication")
        .and_then(|auth| auth.get("runtime_token"))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
}

/// Verifies runtime tokens against the platform key set
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use kiket_auth::{JwksCache, TokenVerifier};
/// # tokio_test::block_on(async {
/// let verifier = TokenVerifier::new(Arc::new(JwksCache::new()));
/// let payload = serde_json::json!({"authentication": {"runtime_token": "eyJ..."}});
///
/// let claims = verifier.verify_runtime_token(&payload, "https://kiket.dev").await?;
/// println!("org {:?}", claims.org_id);
/// # Ok::<(), kiket_auth::AuthError>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    jwks: Arc<JwksCache>,
}

impl TokenVerifier {
    /// Create a verifier backed by a shared key set cache
    pub fn new(jwks: Arc<JwksCache>) -> Self {
        Self { jwks }
    }

    /// The cache this verifier reads keys from
    pub fn jwks_cache(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Verify the runtime token embedded in a webhook payload
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingToken`] if the payload has no (or an empty)
    /// `authentication.runtime_token`; otherwise any error of [`Self::decode_jwt`].
    pub async fn verify_runtime_token(&self, payload: &Value, base_url: &str) -> AuthResult<JwtClaims> {
        let token = extract_runtime_token(payload).ok_or(AuthError::MissingToken)?;
        self.decode_jwt(token, base_url).await
    }

    /// Decode and fully validate a compact JWT
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] if the token is malformed or its signature fails
    /// - [`AuthError::UnsupportedAlgorithm`] if the header algorithm is not ES256
    /// - [`AuthError::JwksFetch`] if the key set cannot be obtained
    /// - [`AuthError::NoSigningKey`] if no eligible key matches the header `kid`
    /// - [`AuthError::UnsupportedCurve`] if the matching key is not EC P-256
    /// - [`AuthError::InvalidIssuer`] if `iss` is not the trusted issuer
    /// - [`AuthError::TokenExpired`] if `exp` is not in the future
    pub async fn decode_jwt(&self, token: &str, base_url: &str) -> AuthResult<JwtClaims> {
        let alg = header_algorithm(token)?;
        if alg != REQUIRED_ALG {
            warn!(algorithm = %alg, "Rejecting runtime token with unsupported algorithm");
            return Err(AuthError::UnsupportedAlgorithm(alg));
        }

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::InvalidToken(format!("Invalid JWT format: {e}"))
        })?;

        let jwks = self.jwks.fetch(base_url).await?;
        let jwk = select_signing_key(&jwks, header.kid.as_deref())?;
        let decoding_key = decoding_key(jwk)?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[TRUSTED_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            _ => {
                warn!(error = %e, kid = ?header.kid, "Runtime token validation failed");
                AuthError::InvalidToken(e.to_string())
            }
        })?;

        // The library accepts exp == now; runtime tokens must still be live
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        debug!(
            sub = ?data.claims.sub,
            org_id = ?data.claims.org_id,
            ext_id = ?data.claims.ext_id,
            jti = ?data.claims.jti,
            "Runtime token verified"
        );

        Ok(data.claims)
    }
}

/// Read the header `alg` exactly as sent
fn header_algorithm(token: &str) -> AuthResult<String> {
    let segment = token
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("Invalid JWT format: empty header".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT format: {e}")))?;
    let header: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT header: {e}")))?;

    header
        .get("alg")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::InvalidToken("JWT header has no alg".to_string()))
}

/// Pick the key the token was signed with
///
/// Only `use=sig`, `alg=ES256` keys are candidates, and the header `kid` must
/// match one of them exactly.
fn select_signing_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> AuthResult<&'a Jwk> {
    let Some(kid) = kid else {
        return Err(AuthError::NoSigningKey { kid: None });
    };

    let jwk = jwks
        .keys
        .iter()
        .filter(|k| k.key_use.as_deref() == Some("sig") && k.alg.as_deref() == Some(REQUIRED_ALG))
        .find(|k| k.kid.as_deref() == Some(kid))
        .ok_or_else(|| AuthError::NoSigningKey {
            kid: Some(kid.to_string()),
        })?;

    if jwk.kty != "EC" || jwk.crv.as_deref() != Some(REQUIRED_CURVE) {
        let curve = jwk.crv.clone().unwrap_or_else(|| jwk.kty.clone());
        return Err(AuthError::UnsupportedCurve(curve));
    }

    Ok(jwk)
}

fn decoding_key(jwk: &Jwk) -> AuthResult<DecodingKey> {
    let (Some(x), Some(y)) = (jwk.x.as_deref(), jwk.y.as_deref()) else {
        return Err(AuthError::InvalidToken("Signing key is missing EC coordinates".to_string()));
    };

    DecodingKey::from_ec_components(x, y)
        .map_err(|e| AuthError::InvalidToken(format!("Invalid signing key: {e}")))
}
