//! Authentication error taxonomy

use thiserror::Error;

/// Reasons an inbound webhook failed authentication
///
/// Every variant maps to `401 Unauthorized` at the HTTP boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The webhook secret is empty or not configured
    #[error("Webhook secret is not configured")]
    Config,

    /// A required signing header is absent
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// The timestamp header is not an integer number of seconds
    #[error("Invalid timestamp header: {0}")]
    InvalidTimestamp(String),

    /// The request timestamp is outside the accepted window
    #[error("Request timestamp outside allowed window ({skew_secs}s skew)")]
    StaleRequest {
        /// Absolute difference between now and the request timestamp
        skew_secs: i64,
    },

    /// The signature does not match the body
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// No runtime token in the payload
    #[error("Missing runtime token")]
    MissingToken,

    /// The token is signed with something other than ES256
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The JWKS endpoint could not be fetched or parsed
    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),

    /// No ES256 signing key matches the token's key id
    #[error("No matching signing key{}", .kid.as_deref().map(|k| format!(" for kid '{k}'")).unwrap_or_default())]
    NoSigningKey {
        /// Key id from the token header, if any
        kid: Option<String>,
    },

    /// The selected key is not a P-256 EC key
    #[error("Unsupported key curve: {0}")]
    UnsupportedCurve(String),

    /// The token's `exp` is not in the future
    #[error("Runtime token expired")]
    TokenExpired,

    /// The token was not issued by the trusted issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// The token is malformed or its signature does not verify
    #[error("Invalid runtime token: {0}")]
    InvalidToken(String),
}

impl AuthError {
    /// Stable machine-readable tag for logs and telemetry
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::MissingHeader(_) => "missing_header",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::StaleRequest { .. } => "stale_request",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingToken => "missing_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::JwksFetch(_) => "jwks_fetch_error",
            Self::NoSigningKey { .. } => "no_signing_key",
            Self::UnsupportedCurve(_) => "unsupported_curve",
            Self::TokenExpired => "token_expired",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidToken(_) => "invalid_token",
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
