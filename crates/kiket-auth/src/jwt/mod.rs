//! Runtime token infrastructure
//!
//! Runtime tokens are ES256 JWTs minted by the platform for a single webhook
//! delivery. They carry the organization, extension and project the delivery
//! belongs to, plus the scopes the extension was granted.
//!
//! # Modules
//!
//! - `jwks` - per-base-URL JWKS fetching and caching
//! - `verifier` - token decoding, key selection and claim validation

pub mod jwks;
pub mod verifier;

pub use jwks::{JWKS_PATH, JWKS_TTL, Jwk, JwkSet, JwksCache};
pub use verifier::{TokenVerifier, extract_runtime_token};

use serde::{Deserialize, Deserializer, Serialize};

/// The only issuer runtime tokens are accepted from
pub const TRUSTED_ISSUER: &str = "kiket.dev";

/// Claims carried by a verified runtime token
///
/// Produced only by [`TokenVerifier`] after signature, issuer and expiry checks
/// have passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Organization id
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,

    /// Extension id
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<i64>,

    /// Project id
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub proj_id: Option<i64>,

    /// Principal (installing user) id
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub pi_id: Option<i64>,

    /// Granted scopes; accepts a single string or an array
    #[serde(default, deserialize_with = "scope_list")]
    pub scopes: Vec<String>,

    /// Source of the delivery (e.g. "webhook", "workflow")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// Issuer
    pub iss: String,

    /// Issued at (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiry (unix seconds)
    pub exp: i64,

    /// Unique token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl JwtClaims {
    /// Whether the token grants `scope`
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Ids are integers, but some issuers serialize them as numeric strings
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Text(String),
    }

    match Option::<Id>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Id::Int(id)) => Ok(Some(id)),
        Some(Id::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn scope_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Scopes>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Scopes::One(s)) => vec![s],
        Some(Scopes::Many(v)) => v,
    })
}
