//! Authentication strategy selection
//!
//! Request signing and runtime tokens are alternative ways of proving a
//! delivery came from the platform. The SDK picks one at startup from its
//! configuration and calls [`Authenticator::authenticate`] for every request.

use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::Arc;

use crate::context::{AuthContext, build_auth_context};
use crate::error::AuthResult;
use crate::jwt::{JwksCache, JwtClaims, TokenVerifier};
use crate::signature::verify_signature;

/// Result of a successful authentication
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// HMAC signature verified; no identity beyond "holds the secret"
    Signed,
    /// Runtime token verified
    Runtime {
        /// Verified claims
        claims: Box<JwtClaims>,
        /// Context derived from the claims
        context: Box<AuthContext>,
    },
}

impl AuthOutcome {
    /// The auth context, when the delivery carried a runtime token
    pub fn context(&self) -> Option<&AuthContext> {
        match self {
            Self::Signed => None,
            Self::Runtime { context, .. } => Some(context.as_ref()),
        }
    }
}

/// Configured authentication strategy
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Verify `X-Kiket-Signature` with the shared webhook secret.
    ///
    /// A `None` secret makes every request fail with [`crate::AuthError::Config`].
    Signature {
        /// Shared webhook secret
        secret: Option<SecretString>,
    },
    /// Verify `authentication.runtime_token` against the JWKS at `base_url`
    RuntimeToken {
        /// Token verifier sharing the process JWKS cache
        verifier: TokenVerifier,
        /// Platform base URL the JWKS is fetched from
        base_url: String,
    },
}

impl Authenticator {
    /// HMAC signature strategy
    pub fn signature(secret: Option<SecretString>) -> Self {
        Self::Signature { secret }
    }

    /// Runtime token strategy
    pub fn runtime_token(jwks: Arc<JwksCache>, base_url: impl Into<String>) -> Self {
        Self::RuntimeToken {
            verifier: TokenVerifier::new(jwks),
            base_url: base_url.into(),
        }
    }

    /// Short name of the strategy, for logs and health output
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Signature { .. } => "signature",
            Self::RuntimeToken { .. } => "runtime_token",
        }
    }

    /// Authenticate one delivery
    ///
    /// `body` must be the raw bytes as received; `payload` is its parsed form
    /// (or `Value::Null` if it did not parse) and is only consulted in runtime
    /// token mode.
    ///
    /// # Errors
    ///
    /// Any [`crate::AuthError`] raised by the configured strategy.
    pub async fn authenticate(&self, body: &[u8], headers: &HeaderMap, payload: &Value) -> AuthResult<AuthOutcome> {
        match self {
            Self::Signature { secret } => {
                let secret = secret.as_ref().map(|s| s.expose_secret().as_str());
                verify_signature(secret, body, headers)?;
                Ok(AuthOutcome::Signed)
            }
            Self::RuntimeToken { verifier, base_url } => {
                let claims = verifier.verify_runtime_token(payload, base_url).await?;
                let context = build_auth_context(&claims, payload);
                Ok(AuthOutcome::Runtime {
                    claims: Box::new(claims),
                    context: Box::new(context),
                })
            }
        }
    }
}
